use anyhow::Result;
use axum::{
    extract::Extension,
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use porch_badges::BadgeEngine;
use porch_core::AppContext;
use porch_groups::GroupsService;
use porch_messaging::MessagingService;
use porch_notify::{LocalPresence, Notifier};
use porch_social::SocialService;

use crate::auth;
use crate::handlers;
use crate::websocket;

/// Everything a request handler needs, shared through an Extension layer.
#[derive(Clone)]
pub struct ApiState {
    pub ctx: AppContext,
    pub presence: Arc<LocalPresence>,
    pub notifier: Arc<Notifier>,
    pub messaging: Arc<MessagingService>,
    pub groups: Arc<GroupsService>,
    pub social: Arc<SocialService>,
    pub badges: Arc<BadgeEngine>,
}

impl ApiState {
    pub fn new(ctx: AppContext, presence: Arc<LocalPresence>, notifier: Arc<Notifier>) -> Self {
        ApiState {
            messaging: Arc::new(MessagingService::new(ctx.clone(), notifier.clone())),
            groups: Arc::new(GroupsService::new(ctx.clone(), notifier.clone())),
            social: Arc::new(SocialService::new(ctx.clone(), notifier.clone())),
            badges: Arc::new(BadgeEngine::new(ctx.clone(), notifier.clone())),
            ctx,
            presence,
            notifier,
        }
    }
}

pub async fn run(state: ApiState) -> Result<()> {
    let api_port = state.ctx.config.server.api_port;

    // Allow specific origins, or everything if CORS_ORIGINS is not set.
    let cors_layer = if let Ok(origins) = env::var("CORS_ORIGINS") {
        let origin_list: Vec<&str> = origins.split(',').map(|s| s.trim()).collect();
        let mut cors = CorsLayer::new();
        for origin in origin_list {
            if let Ok(parsed) = origin.parse::<axum::http::HeaderValue>() {
                cors = cors.allow_origin(parsed);
            }
        }
        cors.allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(true)
    } else {
        tracing::warn!("CORS_ORIGINS not set, using permissive CORS. Set CORS_ORIGINS for production!");
        CorsLayer::permissive()
    };

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/ws", get(websocket::websocket_handler))
        .route("/direct/send", post(handlers::direct::send))
        .route("/direct/conversations", get(handlers::direct::conversations))
        .route("/direct/unread/count", get(handlers::direct::unread_count))
        .route("/direct/:user_id/messages", get(handlers::direct::list))
        .route("/direct/messages/:id", patch(handlers::direct::edit))
        .route("/direct/messages/:id", delete(handlers::direct::remove))
        .route("/direct/messages/:id/react", post(handlers::direct::react))
        .route("/groups", post(handlers::groups::create))
        .route("/groups/:group_id/messages", post(handlers::groups::send_message))
        .route("/groups/:group_id/messages", get(handlers::groups::list_messages))
        .route("/groups/:group_id/messages/:id", patch(handlers::groups::edit_message))
        .route("/groups/:group_id/messages/:id", delete(handlers::groups::delete_message))
        .route("/groups/:group_id/messages/:id/react", post(handlers::groups::react_message))
        .route("/groups/:group_id/members", post(handlers::groups::add_member))
        .route("/groups/:group_id/members/:member_id", delete(handlers::groups::remove_member))
        .route("/groups/:group_id/members/:member_id/role", patch(handlers::groups::change_role))
        .route("/groups/:group_id/invite", post(handlers::groups::invite))
        .route("/groups/invites", get(handlers::groups::list_invites))
        .route("/groups/:group_id/invites/:invite_id/accept", post(handlers::groups::accept_invite))
        .route("/groups/:group_id/invites/:invite_id/reject", post(handlers::groups::reject_invite))
        .route("/groups/:group_id/leave", post(handlers::groups::leave))
        .route("/follows/follow/:id", post(handlers::follows::follow))
        .route("/follows/unfollow/:id", post(handlers::follows::unfollow))
        .route("/notifications", get(handlers::notifications::list))
        .route("/notifications/unread/count", get(handlers::notifications::unread_count))
        .route("/notifications/:id/read", post(handlers::notifications::mark_read))
        .route("/notifications/read-all", post(handlers::notifications::mark_all_read))
        .route("/notifications/:id", delete(handlers::notifications::remove))
        .route("/badges/progress", get(handlers::badges::progress))
        .layer(
            ServiceBuilder::new()
                .layer(Extension(state))
                .layer(middleware::from_fn(auth::auth_middleware))
                .layer(cors_layer),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], api_port));
    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
