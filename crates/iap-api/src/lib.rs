//! # iap-api
//!
//! HTTP host application for storehub-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server over a `StoreHub`
//! - REST endpoints for provider lifecycle, catalog and purchases
//! - Startup wiring: hook binding, sandbox registration, event logging
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | GET | `/api/v1/providers` | List providers |
//! | GET | `/api/v1/providers/{id}` | Get provider |
//! | POST | `/api/v1/providers/{id}/initialize` | Initialize provider |
//! | POST | `/api/v1/providers/{id}/dispose` | Dispose provider |
//! | GET | `/api/v1/products` | Query products |
//! | POST | `/api/v1/purchases` | Start purchase |
//! | GET | `/api/v1/purchases` | List purchases |
//! | POST | `/api/v1/restore` | Restore purchases |

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppConfig, AppState};
