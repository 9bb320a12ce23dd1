use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use hub_gateway::connection;

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{bots, communities, dms, invites, messages, polls, reactions, roles, scheduled};

/// The whole HTTP surface: auth, REST, the bot entry point and the gateway.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/communities/public", get(communities::list_public_communities))
        .route("/bot/messages", post(bots::post_bot_message));

    let protected_routes = Router::new()
        // Communities
        .route("/communities", post(communities::create_community))
        .route("/me/communities", get(communities::list_my_communities))
        .route("/communities/{id}", get(communities::get_community))
        .route("/communities/{id}/join", post(communities::join_community))
        .route("/communities/{id}/leave", post(communities::leave_community))
        .route(
            "/communities/{id}/channels",
            get(communities::list_channels).post(communities::create_channel),
        )
        .route("/communities/{id}/members", get(communities::list_members))
        .route("/communities/{id}/search", get(communities::search_community))
        .route(
            "/communities/{id}/emojis",
            get(communities::list_emojis).post(communities::add_emoji),
        )
        // Roles and permissions
        .route(
            "/communities/{id}/roles",
            get(roles::list_roles).post(roles::create_role),
        )
        .route("/communities/{id}/members/{user_id}/role", put(roles::assign_role))
        .route(
            "/communities/{id}/members/{user_id}/permissions",
            get(roles::member_permissions),
        )
        // Bots and invites
        .route(
            "/communities/{id}/bots",
            get(bots::list_bots).post(bots::create_bot),
        )
        .route("/bots/{id}/active", put(bots::set_bot_active))
        .route(
            "/communities/{id}/invites",
            get(invites::list_invites).post(invites::create_invite),
        )
        .route("/invites/{id}", delete(invites::revoke_invite))
        .route("/invites/{id}/redeem", post(invites::redeem_invite))
        // Channels
        .route(
            "/channels/{id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/channels/{id}/search", get(messages::search_channel))
        .route("/channels/{id}/pins", get(messages::list_pins))
        .route(
            "/channels/{id}/polls",
            get(polls::list_polls).post(polls::create_poll),
        )
        .route("/channels/{id}/scheduled", post(scheduled::schedule_message))
        // Messages
        .route(
            "/messages/{id}",
            get(messages::get_message)
                .patch(messages::edit_message)
                .delete(messages::delete_message),
        )
        .route("/messages/{id}/forward", post(messages::forward_message))
        .route(
            "/messages/{id}/pin",
            post(messages::pin_message).delete(messages::unpin_message),
        )
        .route(
            "/messages/{id}/reactions/{emoji}",
            put(reactions::add_reaction).delete(reactions::remove_reaction),
        )
        .route(
            "/messages/{id}/thread",
            get(messages::get_thread).post(messages::create_thread),
        )
        .route(
            "/messages/{id}/thread/replies",
            get(messages::list_thread_replies).post(messages::add_thread_reply),
        )
        // Polls and scheduling
        .route("/polls/{id}", get(polls::get_poll_results))
        .route("/polls/{id}/votes", post(polls::vote))
        .route("/scheduled", get(scheduled::list_scheduled))
        .route("/scheduled/{id}", delete(scheduled::cancel_scheduled))
        // Direct messages
        .route(
            "/dms",
            get(dms::list_conversations).post(dms::open_conversation),
        )
        .route(
            "/dms/{id}/messages",
            get(dms::list_messages).post(dms::send_message),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let ws_route = Router::new().route("/ws/community", get(ws_upgrade));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let ctx = state.gateway_context();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, ctx))
}
