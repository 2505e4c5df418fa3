//! Browser-facing side: the client (bank) app and the verification app.
//!
//! Both are server-rendered axum routers. Per-browser navigation state lives
//! in the hand-off store behind a session cookie.

mod client_app;
mod forms;
mod pages;
mod server;
mod session;
mod verifier_app;

pub use server::start_servers;
