//! # signalk-mqtt-web
//!
//! REST API and static rule editor for the Signal K MQTT importer.
//!
//! ## Routes
//!
//! - `GET/POST /api/rules` - read or replace the import rules
//! - `GET /api/mqtt-status` - broker connection details
//! - `POST /api/test-mqtt` - check that the broker connection is up
//! - `GET /api/stats` - rule counts and message counters
//! - everything else - static files from the configured public directory
//!
//! ## Usage
//!
//! ```rust,ignore
//! use signalk_mqtt_web::create_router;
//!
//! let app = create_router(service.clone(), Some(Path::new("public")));
//! let listener = TcpListener::bind("0.0.0.0:3001").await?;
//! axum::serve(listener, app).await?;
//! ```

pub mod error;
pub mod routes;

pub use error::ApiError;
pub use routes::create_router;

use std::sync::Arc;

use signalk_mqtt_server::ImportService;

/// Type alias for shared state in Axum handlers.
pub type AppState = Arc<ImportService>;
