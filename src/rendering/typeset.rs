//! TeX -> SVG typesetting

use crate::error::TypesetError;

/// Marker MathJax puts on the node it renders in place of input it could not parse.
const ERROR_NODE: &str = "data-mml-node=\"merror\"";
const ERROR_ATTR: &str = "data-mjx-error=\"";

/// Something that turns TeX markup into a standalone SVG document.
///
/// Implementations must be stateless from the caller's point of view: the same
/// input is always typeset from scratch.
pub trait Typesetter: Send + Sync {
    fn typeset(&self, tex: &str) -> Result<String, TypesetError>;
}

impl<F> Typesetter for F
where
    F: Fn(&str) -> Result<String, TypesetError> + Send + Sync,
{
    fn typeset(&self, tex: &str) -> Result<String, TypesetError> {
        self(tex)
    }
}

/// Typesetter backed by the embedded MathJax runtime (TeX input, SVG output).
///
/// Output is display-mode math. The runtime is created lazily by the engine
/// crate on the first call made from each thread.
#[cfg(feature = "mathjax")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MathJax;

#[cfg(feature = "mathjax")]
impl MathJax {
    pub fn new() -> Self {
        MathJax
    }
}

#[cfg(feature = "mathjax")]
impl Typesetter for MathJax {
    fn typeset(&self, tex: &str) -> Result<String, TypesetError> {
        let svg = mathjax_svg::convert_to_svg(tex)
            .map_err(|e| TypesetError::Engine(e.to_string()))?;
        check_output(&svg)?;
        Ok(svg)
    }
}

/// Reject engine output that is empty or that contains an error node.
///
/// Stock MathJax does not fail on malformed TeX; it draws the error message
/// into the SVG instead. The embedded runtime behind `MathJax` already raises
/// on such output (reported as `TypesetError::Engine`), so for it this only
/// guards against empty output. Other `Typesetter`s producing raw MathJax SVG
/// get error nodes turned into `TypesetError::Rejected`.
pub fn check_output(svg: &str) -> Result<(), TypesetError> {
    if svg.trim().is_empty() {
        return Err(TypesetError::EmptyOutput);
    }
    if let Some(pos) = svg.find(ERROR_NODE) {
        let message = svg[pos..]
            .find(ERROR_ATTR)
            .map(|start| &svg[pos + start + ERROR_ATTR.len()..])
            .and_then(|rest| rest.find('"').map(|end| rest[..end].to_string()))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "invalid TeX".to_string());
        return Err(TypesetError::Rejected(message));
    }
    Ok(())
}
