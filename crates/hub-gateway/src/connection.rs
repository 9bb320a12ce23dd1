use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{debug, info, warn};
use uuid::Uuid;

use hub_service::{Author, MessageService, ServiceError, ServiceResult};
use hub_types::api::Claims;
use hub_types::events::{ClientEnvelope, InboundFrame, ReactionAction, ServerEvent};
use hub_types::models::OnlineUser;

use crate::dispatcher::Dispatcher;
use crate::run_blocking;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Longest raw frame echoed into logs.
const LOG_SNIPPET: usize = 200;

/// Everything a connection needs from the server.
#[derive(Clone)]
pub struct GatewayContext {
    pub service: MessageService,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
    /// When set, `join` must carry a valid session token.
    pub require_session: bool,
}

/// Per-connection state: `Disconnected -> Joined -> Disconnected`.
enum ConnState {
    Disconnected,
    Joined(Session),
}

struct Session {
    channel_id: String,
    /// Set when the client named a community on join; drives the member's online flag.
    community_id: Option<String>,
    author: Author,
}

/// Drives one `/ws/community` connection until the socket closes or the
/// heartbeat times out.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut outbox) = ctx.dispatcher.register_connection().await;
    debug!(%conn_id, "Gateway connection opened");

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Outbox -> socket, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = outbox.recv() => {
                    let Some(frame) = frame else { break };
                    if sender.send(Message::Text(frame.as_ref().into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!(%conn_id, "Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Socket -> handlers, one frame at a time. The receive side stays on this
    // task so the session is still at hand for the leave sequence.
    let mut state = ConnState::Disconnected;
    loop {
        tokio::select! {
            _ = &mut send_task => break,
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    handle_text(&ctx, conn_id, &mut state, text.as_str()).await;
                }
                Some(Ok(Message::Pong(_))) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    send_task.abort();

    if let ConnState::Joined(session) = state {
        leave(&ctx, conn_id, session).await;
    }
    ctx.dispatcher.unregister_connection(conn_id).await;
    debug!(%conn_id, "Gateway connection closed");
}

async fn handle_text(ctx: &GatewayContext, conn_id: Uuid, state: &mut ConnState, text: &str) {
    let frame = match serde_json::from_str::<InboundFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(
                %conn_id,
                "Bad frame: {} -- raw: {}",
                e,
                snippet(text)
            );
            let request_id = serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .and_then(|v| v.get("requestId")?.as_str().map(str::to_string));
            let err = ServiceError::Validation(format!("malformed frame: {e}"));
            send_error(ctx, conn_id, request_id, &err).await;
            return;
        }
    };

    let kind = frame.envelope.kind();
    if let Err(err) = handle_envelope(ctx, conn_id, state, frame.envelope).await {
        warn!(%conn_id, kind, error_kind = err.kind().as_str(), "Rejected {}: {}", kind, err);
        send_error(ctx, conn_id, frame.request_id, &err).await;
    }
}

async fn send_error(
    ctx: &GatewayContext,
    conn_id: Uuid,
    request_id: Option<String>,
    err: &ServiceError,
) {
    let message = match err {
        // store internals stay in the log
        ServiceError::Store(_) => "internal error".to_string(),
        other => other.to_string(),
    };
    ctx.dispatcher
        .send_to_connection(
            conn_id,
            &ServerEvent::Error {
                request_id,
                kind: err.kind(),
                message,
            },
        )
        .await;
}

async fn handle_envelope(
    ctx: &GatewayContext,
    conn_id: Uuid,
    state: &mut ConnState,
    envelope: ClientEnvelope,
) -> ServiceResult<()> {
    match envelope {
        ClientEnvelope::Join {
            channel_id,
            community_id,
            user_id,
            username,
            token,
        } => {
            let author = resolve_identity(ctx, user_id, username, token.as_deref())?;
            if channel_id.trim().is_empty() {
                return Err(ServiceError::Validation("channelId is required".into()));
            }

            let lookup = channel_id.clone();
            let channel = run_blocking(&ctx.service, move |svc| {
                svc.db()
                    .get_channel(&lookup)?
                    .ok_or_else(|| ServiceError::NotFound("channel".into()))
            })
            .await?;
            if let Some(cid) = &community_id {
                if *cid != channel.community_id {
                    return Err(ServiceError::Validation(
                        "channel does not belong to that community".into(),
                    ));
                }
            }

            if let ConnState::Joined(previous) =
                std::mem::replace(state, ConnState::Disconnected)
            {
                leave(ctx, conn_id, previous).await;
            }

            let session = Session {
                channel_id,
                community_id,
                author,
            };
            enter(ctx, conn_id, &session).await;
            *state = ConnState::Joined(session);
            Ok(())
        }

        ClientEnvelope::Message {
            content,
            reply_to_id,
            attachment,
        } => {
            let session = joined(state)?;
            let channel_id = session.channel_id.clone();
            let author = session.author.clone();
            let view = run_blocking(&ctx.service, move |svc| {
                svc.send_message(
                    &channel_id,
                    &author,
                    content.as_deref().unwrap_or_default(),
                    reply_to_id.as_deref(),
                    attachment,
                )
            })
            .await?;
            ctx.dispatcher
                .broadcast_to_channel(
                    &session.channel_id,
                    &ServerEvent::NewMessage { message: view },
                    None,
                )
                .await;
            Ok(())
        }

        ClientEnvelope::Reaction {
            message_id,
            emoji,
            action,
        } => {
            let session = joined(state)?;
            let author = session.author.clone();
            let id = message_id.clone();
            let channel_id = session.channel_id.clone();
            let reactions = run_blocking(&ctx.service, move |svc| {
                check_channel(svc, &id, &channel_id)?;
                match action {
                    ReactionAction::Add => svc.add_reaction(&id, &author, &emoji),
                    ReactionAction::Remove => svc.remove_reaction(&id, &author.user_id, &emoji),
                }
            })
            .await?;
            ctx.dispatcher
                .broadcast_to_channel(
                    &session.channel_id,
                    &ServerEvent::ReactionUpdate {
                        message_id,
                        reactions,
                    },
                    None,
                )
                .await;
            Ok(())
        }

        ClientEnvelope::Typing => {
            let session = joined(state)?;
            ctx.dispatcher
                .broadcast_to_channel(
                    &session.channel_id,
                    &ServerEvent::Typing {
                        user_id: session.author.user_id.clone(),
                        username: session.author.username.clone(),
                    },
                    Some(&session.author.user_id),
                )
                .await;
            Ok(())
        }

        ClientEnvelope::EditMessage {
            message_id,
            content,
        } => {
            let session = joined(state)?;
            let actor = session.author.user_id.clone();
            let channel_id = session.channel_id.clone();
            let message = run_blocking(&ctx.service, move |svc| {
                check_channel(svc, &message_id, &channel_id)?;
                svc.edit_message(&message_id, &actor, &content)
            })
            .await?;
            ctx.dispatcher
                .broadcast_to_channel(
                    &session.channel_id,
                    &ServerEvent::MessageEdited { message },
                    None,
                )
                .await;
            Ok(())
        }

        ClientEnvelope::DeleteMessage { message_id } => {
            let session = joined(state)?;
            let actor = session.author.user_id.clone();
            let channel_id = session.channel_id.clone();
            let deleted = run_blocking(&ctx.service, move |svc| {
                check_channel(svc, &message_id, &channel_id)?;
                svc.delete_message(&message_id, &actor)
            })
            .await?;
            ctx.dispatcher
                .broadcast_to_channel(
                    &session.channel_id,
                    &ServerEvent::MessageDeleted {
                        message_id: deleted.id,
                    },
                    None,
                )
                .await;
            Ok(())
        }
    }
}

fn snippet(text: &str) -> &str {
    match text.char_indices().nth(LOG_SNIPPET) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

fn joined(state: &ConnState) -> ServiceResult<&Session> {
    match state {
        ConnState::Joined(session) => Ok(session),
        ConnState::Disconnected => Err(ServiceError::Unauthorized("join a channel first".into())),
    }
}

/// Gateway frames only act on messages of the joined channel. Unknown ids
/// pass through so the service reports them the usual way.
fn check_channel(svc: &MessageService, message_id: &str, channel_id: &str) -> ServiceResult<()> {
    match svc.db().get_message(message_id)? {
        Some(message) if message.channel_id != channel_id => Err(ServiceError::Validation(
            "message belongs to another channel".into(),
        )),
        _ => Ok(()),
    }
}

/// A valid token overrides the asserted identity. Without one, the asserted
/// identity is trusted unless sessions are required.
fn resolve_identity(
    ctx: &GatewayContext,
    user_id: String,
    username: String,
    token: Option<&str>,
) -> ServiceResult<Author> {
    match token {
        Some(token) => {
            let claims = decode::<Claims>(
                token,
                &DecodingKey::from_secret(ctx.jwt_secret.as_bytes()),
                &Validation::default(),
            )
            .map_err(|e| ServiceError::Unauthorized(format!("invalid session token: {e}")))?
            .claims;
            Ok(Author::new(claims.sub, claims.username))
        }
        None if ctx.require_session => Err(ServiceError::Unauthorized(
            "a session token is required to join".into(),
        )),
        None => {
            if user_id.trim().is_empty() || username.trim().is_empty() {
                return Err(ServiceError::Validation(
                    "userId and username are required".into(),
                ));
            }
            Ok(Author::new(user_id, username))
        }
    }
}

/// Registers presence, marks the member online, announces the arrival to the
/// channel and hands the joining connection the current online list.
async fn enter(ctx: &GatewayContext, conn_id: Uuid, session: &Session) {
    let user = OnlineUser {
        user_id: session.author.user_id.clone(),
        username: session.author.username.clone(),
    };
    ctx.dispatcher
        .presence()
        .register(&session.channel_id, conn_id, user)
        .await;
    info!(
        %conn_id,
        channel_id = %session.channel_id,
        "{} ({}) joined",
        session.author.username,
        session.author.user_id
    );

    if let Some(community_id) = &session.community_id {
        ctx.dispatcher
            .link_member(community_id, &session.author.user_id)
            .await;
        mark_online(ctx, community_id, &session.author.user_id, true).await;
    }

    ctx.dispatcher
        .broadcast_to_channel(
            &session.channel_id,
            &ServerEvent::UserJoined {
                user_id: session.author.user_id.clone(),
                username: session.author.username.clone(),
                timestamp: Utc::now(),
            },
            None,
        )
        .await;

    let users = ctx
        .dispatcher
        .presence()
        .list_online(&session.channel_id)
        .await;
    ctx.dispatcher
        .send_to_connection(conn_id, &ServerEvent::Presence { users })
        .await;
}

/// Inverse of `enter`. The durable online flag is only cleared once the
/// user has no joined connection left anywhere in the community.
async fn leave(ctx: &GatewayContext, conn_id: Uuid, session: Session) {
    ctx.dispatcher
        .presence()
        .unregister(&session.channel_id, conn_id)
        .await;
    info!(
        %conn_id,
        channel_id = %session.channel_id,
        "{} ({}) left",
        session.author.username,
        session.author.user_id
    );

    if let Some(community_id) = &session.community_id {
        let remaining = ctx
            .dispatcher
            .unlink_member(community_id, &session.author.user_id)
            .await;
        if remaining == 0 {
            mark_online(ctx, community_id, &session.author.user_id, false).await;
        }
    }

    ctx.dispatcher
        .broadcast_to_channel(
            &session.channel_id,
            &ServerEvent::UserLeft {
                user_id: session.author.user_id,
                username: session.author.username,
                timestamp: Utc::now(),
            },
            None,
        )
        .await;
}

async fn mark_online(ctx: &GatewayContext, community_id: &str, user_id: &str, online: bool) {
    let (cid, uid) = (community_id.to_string(), user_id.to_string());
    match run_blocking(&ctx.service, move |svc| svc.set_member_online(&cid, &uid, online)).await {
        Ok(true) => {}
        Ok(false) => debug!(community_id, user_id, "Not a member; online flag untouched"),
        Err(e) => warn!(community_id, user_id, "Failed to update online flag: {}", e),
    }
}
