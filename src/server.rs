//! HTTP surface: routing, request validation and the listener loop
//!
//! Connections are accepted by `tiny_http` on tokio's blocking pool and every
//! request is handled on its own task, so a slow render never holds up other
//! requests. Rendering itself is CPU-bound and runs under `spawn_blocking`,
//! at most `max_concurrent_renders` jobs at a time.

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tiny_http::{Header, Method, Request, Response};
use tokio::sync::Semaphore;

use crate::error::{Error, Result};
use crate::rendering::typeset::Typesetter;
use crate::rendering::{RenderedImage, Renderer};
use crate::ServerConfig;

pub const GREETING: &str = "Hello from mathpng!";
pub const MISSING_MATH: &str = "Missing or empty 'math' parameter.";
pub const INVALID_WIDTH: &str = "Invalid 'w' parameter.";

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const IMAGE_PNG: &str = "image/png";

/// A validated `/mathjax` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    /// TeX source as sent (not trimmed)
    pub math: String,
    /// Content width in px, if the caller asked for one
    pub width: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Index,
    Render(RenderRequest),
    NotFound,
    MethodNotAllowed,
}

/// Resolve a request line to a route.
///
/// Only `/mathjax` looks at the query string; it fails with
/// `Error::InvalidInput` when `math` is missing or blank, or when `w` is not
/// an integer in `1..=max_width`.
pub fn route(method: &Method, url: &str, max_width: u32) -> Result<Route> {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    match path {
        "/" | "/mathjax" if *method != Method::Get => Ok(Route::MethodNotAllowed),
        "/" => Ok(Route::Index),
        "/mathjax" => parse_render_query(query, max_width).map(Route::Render),
        _ => Ok(Route::NotFound),
    }
}

fn parse_render_query(query: &str, max_width: u32) -> Result<RenderRequest> {
    let mut math = None;
    let mut width = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "math" if math.is_none() => math = Some(value.into_owned()),
            "w" if width.is_none() => width = Some(value.into_owned()),
            _ => {}
        }
    }

    // `math` is checked first: a blank expression is a 400 whatever else was sent.
    let math = math
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| Error::InvalidInput(MISSING_MATH.into()))?;

    let width = match width.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(w) => match w.parse::<u32>() {
            Ok(w) if (1..=max_width).contains(&w) => Some(w),
            _ => return Err(Error::InvalidInput(INVALID_WIDTH.into())),
        },
    };

    Ok(RenderRequest { math, width })
}

/// A fully-formed response, independent of the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: TEXT_PLAIN,
            body: body.into().into_bytes(),
        }
    }

    pub fn png(data: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: IMAGE_PNG,
            body: data,
        }
    }

    pub fn from_error(err: &Error) -> Self {
        Self::text(err.status_code(), err.public_message())
    }

    fn into_response(self) -> Response<Cursor<Vec<u8>>> {
        let mut response = Response::from_data(self.body).with_status_code(self.status);
        if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], self.content_type.as_bytes()) {
            response.add_header(header);
        }
        response
    }
}

/// Request handling on top of a shared `Renderer`
pub struct Service<T> {
    renderer: Arc<Renderer<T>>,
    render_slots: Arc<Semaphore>,
    timeout: Option<Duration>,
    max_width: u32,
}

impl<T: Typesetter + 'static> Service<T> {
    pub fn new(renderer: Renderer<T>, config: &ServerConfig) -> Self {
        Self {
            renderer: Arc::new(renderer),
            render_slots: Arc::new(Semaphore::new(config.max_concurrent_renders.max(1))),
            timeout: (config.timeout_ms > 0).then(|| Duration::from_millis(config.timeout_ms)),
            max_width: config.max_width,
        }
    }

    /// Produce the reply for a request line. Never fails: errors become 4xx/5xx replies.
    pub async fn handle(&self, method: &Method, url: &str) -> Reply {
        match route(method, url, self.max_width) {
            Ok(Route::Index) => Reply::text(200, GREETING),
            Ok(Route::Render(request)) => match self.render(request).await {
                Ok(image) => Reply::png(image.png_data),
                Err(err) => {
                    error!("Error processing request: {}", err);
                    Reply::from_error(&err)
                }
            },
            Ok(Route::NotFound) => Reply::text(404, "Not Found"),
            Ok(Route::MethodNotAllowed) => Reply::text(405, "Method Not Allowed"),
            Err(err) => {
                debug!("Rejected request {}: {}", url, err);
                Reply::from_error(&err)
            }
        }
    }

    /// Run the render pipeline off the async workers, bounded by the timeout.
    ///
    /// The timeout covers waiting for a render slot as well as the render.
    /// On timeout the blocking job is left to finish on its own; it keeps its
    /// slot until it does, and its result is dropped.
    pub async fn render(&self, request: RenderRequest) -> Result<RenderedImage> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.render_in_slot(request))
                .await
                .map_err(|_| Error::Timeout(limit.as_millis() as u64))?,
            None => self.render_in_slot(request).await,
        }
    }

    async fn render_in_slot(&self, request: RenderRequest) -> Result<RenderedImage> {
        let slot = Arc::clone(&self.render_slots)
            .acquire_owned()
            .await
            .map_err(|e| Error::Other(format!("Render slots closed: {}", e)))?;

        let renderer = Arc::clone(&self.renderer);
        let job = tokio::task::spawn_blocking(move || {
            let _slot = slot;
            renderer.render(&request.math, request.width)
        });
        job.await
            .map_err(|e| Error::Other(format!("Render task failed: {}", e)))?
    }

    /// Handle a request from the listener and send exactly one response.
    pub async fn respond(&self, request: Request) {
        let method = request.method().clone();
        let url = request.url().to_string();
        let reply = self.handle(&method, &url).await;

        let path = url.split('?').next().unwrap_or_default();
        info!("{} {} -> {}", method, path, reply.status);

        match tokio::task::spawn_blocking(move || request.respond(reply.into_response())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to send response: {}", e),
            Err(e) => warn!("Response task failed: {}", e),
        }
    }
}

/// Stops a running `Server` from another task
#[derive(Clone)]
pub struct ShutdownHandle {
    http: Arc<tiny_http::Server>,
    stopping: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.http.unblock();
    }
}

/// The HTTP listener
pub struct Server<T> {
    http: Arc<tiny_http::Server>,
    service: Arc<Service<T>>,
    stopping: Arc<AtomicBool>,
}

impl<T: Typesetter + 'static> Server<T> {
    pub fn bind(addr: SocketAddr, service: Service<T>) -> Result<Self> {
        let http = tiny_http::Server::http(addr)
            .map_err(|e| Error::Server(format!("Failed to listen on {}: {}", addr, e)))?;
        Ok(Self {
            http: Arc::new(http),
            service: Arc::new(service),
            stopping: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.http.server_addr().to_ip()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            http: Arc::clone(&self.http),
            stopping: Arc::clone(&self.stopping),
        }
    }

    /// Accept requests until `ShutdownHandle::shutdown` is called.
    pub async fn run(self) -> Result<()> {
        loop {
            let http = Arc::clone(&self.http);
            let received = tokio::task::spawn_blocking(move || http.recv())
                .await
                .map_err(|e| Error::Other(format!("Accept task failed: {}", e)))?;

            if self.stopping.load(Ordering::SeqCst) {
                break;
            }

            let request = match received {
                Ok(request) => request,
                Err(e) => {
                    warn!("Failed to accept request: {}", e);
                    continue;
                }
            };

            let service = Arc::clone(&self.service);
            tokio::spawn(async move { service.respond(request).await });
        }

        info!("Server stopped");
        Ok(())
    }
}
