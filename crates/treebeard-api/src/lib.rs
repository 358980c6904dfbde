//! JSON REST API for Treebeard.
//!
//! Exposes an axum [`Router`] over a [`Treebeard`] facade. Authentication is
//! the caller's concern: every handler reads the authenticated
//! [`User`](treebeard_core::user::User) from the request extensions, so the
//! router must sit behind a layer that inserts one.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", treebeard_api::api_router(service.clone()))
//! ```

pub mod chat;
pub mod conversations;
pub mod dashboards;
pub mod error;
pub mod uploads;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, patch, post},
};
use treebeard_core::{Treebeard, external::Collaborators, store::BlobStore};

pub use error::ApiError;

/// The facade as shared handler state.
pub type Service<S, X> = Arc<Treebeard<S, X>>;

/// Build the API router for `service`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, X>(service: Service<S, X>) -> Router<()>
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  Router::new()
    // Dashboards
    .route("/dashboards/{id}", get(dashboards::get_one::<S, X>))
    .route("/dashboards/{id}/refresh", post(dashboards::refresh::<S, X>))
    // Chat
    .route("/chat", post(chat::send::<S, X>))
    .route("/chat/invisible", post(chat::send_invisible::<S, X>))
    // Conversations
    .route("/conversations", get(conversations::list::<S, X>))
    .route(
      "/conversations/{id}",
      get(conversations::get_one::<S, X>)
        .put(conversations::save::<S, X>)
        .delete(conversations::delete_one::<S, X>),
    )
    .route("/conversations/{id}/name", patch(conversations::rename::<S, X>))
    // Uploads
    .route("/uploads", post(uploads::request_url::<S, X>))
    .route(
      "/conversations/{id}/uploads",
      get(uploads::list::<S, X>),
    )
    .route(
      "/conversations/{id}/uploads/{key}/finalize",
      post(uploads::finalize::<S, X>),
    )
    .route(
      "/conversations/{id}/uploads/{key}",
      delete(uploads::delete_one::<S, X>),
    )
    .with_state(service)
}
