//! mathpng
//!
//! A small HTTP service that renders TeX math to PNG. `GET /mathjax?math=...`
//! typesets the expression with MathJax into SVG, rasterizes the SVG onto an
//! opaque, padded canvas and answers with the PNG bytes.
//!
//! # Example
//!
//! ```no_run
//! use mathpng::rendering::Renderer;
//! use mathpng::server::{Server, Service};
//! use mathpng::{ServerConfig, TypesetError};
//!
//! // Any `Fn(&str) -> Result<String, TypesetError>` can stand in for the
//! // MathJax engine (`rendering::typeset::MathJax`, feature `mathjax`).
//! fn boxed(_tex: &str) -> Result<String, TypesetError> {
//!     Ok(r#"<svg xmlns="http://www.w3.org/2000/svg" width="8" height="4"><rect width="8" height="4"/></svg>"#.into())
//! }
//!
//! # async fn run() -> mathpng::Result<()> {
//! let config = ServerConfig::default();
//! let renderer = Renderer::new(boxed, config.raster.clone());
//! let server = Server::bind(config.addr(), Service::new(renderer, &config))?;
//! server.run().await
//! # }
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub mod error;
pub use error::{Error, RasterError, Result, TypesetError};

// TeX -> SVG -> PNG pipeline
pub mod rendering;
pub use rendering::raster::{Fit, RasterOptions, Rgb};
pub use rendering::{RenderedImage, Renderer};

// HTTP surface
pub mod server;

/// Service configuration
///
/// The defaults match the stock deployment: listen on port 3000 on every
/// interface, give each render 30 seconds, and rasterize with
/// `RasterOptions::default()`.
///
/// # Examples
///
/// ```
/// let cfg = mathpng::ServerConfig::default();
/// assert_eq!(cfg.addr().port(), 3000);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to listen on
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Per-request render timeout in milliseconds (0 => disabled)
    pub timeout_ms: u64,
    /// Largest accepted `w` query parameter
    pub max_width: u32,
    /// Renders allowed to run at once; further requests wait for a slot
    pub max_concurrent_renders: usize,
    /// Rasterization settings
    pub raster: RasterOptions,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
            timeout_ms: 30000,
            max_width: 4096,
            max_concurrent_renders: num_cpus::get(),
            raster: RasterOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.addr(), "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.timeout_ms, 30000);
        assert!(config.max_concurrent_renders >= 1);
        assert_eq!(config.raster.scale_factor, 10.0);
        assert_eq!(config.raster.padding_px, 20);
        assert_eq!(config.raster.background, Rgb::WHITE);
    }

    #[test]
    fn test_addr_uses_host() {
        let config = ServerConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8080,
            ..Default::default()
        };
        assert_eq!(config.addr().to_string(), "127.0.0.1:8080");
    }
}
