//! mbta-relay - a small reverse proxy in front of the MBTA v3 API
//!
//! Three fixed routes are forwarded upstream with the configured API key
//! attached, and the upstream body is streamed back unchanged:
//!
//! | Inbound          | Upstream                                   | Content type        |
//! |------------------|--------------------------------------------|---------------------|
//! | `GET /vehicles`  | `/vehicles?filter[route]=<subway lines>`   | `text/event-stream` |
//! | `GET /routes`    | `/routes`                                  | `application/json`  |
//! | `GET /stops`     | `/stops?filter[route]=<subway lines>`      | `application/json`  |
//!
//! `OPTIONS` on any path is answered locally as a CORS preflight, and every
//! response allows any origin.
//!
//! The main components are organized into the following modules:
//! - `config`: Configuration loading (YAML file and environment)
//! - `cors`: Cross-origin headers and preflight answers
//! - `logging`: Logging system initialization
//! - `relay`: Streaming the upstream body back to the caller
//! - `route`: The fixed route table
//! - `server`: TCP/TLS listener and connection tasks
//! - `service`: Hyper service dispatching requests
//! - `upstream`: Outbound HTTPS client
//! - `utils`: URI helpers

pub mod config;
pub mod cors;
pub mod logging;
pub mod relay;
pub mod route;
pub mod server;
pub mod service;
pub mod upstream;
pub mod utils;
