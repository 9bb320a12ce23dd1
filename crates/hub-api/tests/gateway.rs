mod common;

use serde_json::json;

use common::*;
use hub_service::Author;

/// Alice owns a community that bob and carol joined; returns the general channel.
fn seed(server: &TestServer) -> (String, String) {
    let svc = server.service();
    let community = svc
        .create_community(&Author::new("u1", "alice"), "rustaceans", None, true)
        .unwrap();
    svc.join_community(&community.id, &Author::new("u2", "bob")).unwrap();
    svc.join_community(&community.id, &Author::new("u3", "carol")).unwrap();
    let general = svc.list_channels(&community.id).unwrap().remove(0);
    (community.id, general.id)
}

#[tokio::test]
async fn message_reaction_and_edit_flow() {
    let server = spawn_server(false).await;
    let (_, channel) = seed(&server);

    let mut alice = connect(server.addr).await;
    join(&mut alice, &channel, "u1", "alice").await;
    let mut bob = connect(server.addr).await;
    let presence = join(&mut bob, &channel, "u2", "bob").await;
    let online: Vec<&str> = presence["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["userId"].as_str().unwrap())
        .collect();
    assert_eq!(online, vec!["u1", "u2"]);

    let arrival = next_of(&mut alice, "user_joined").await;
    assert_eq!(arrival["userId"], "u2");

    // u1 says hello; the other client sees it exactly once
    send(&mut alice, json!({ "type": "message", "content": "hello" })).await;
    let event = next_of(&mut bob, "new_message").await;
    assert_eq!(event["message"]["content"], "hello");
    assert_eq!(event["message"]["userId"], "u1");
    assert_eq!(event["message"]["reactions"], json!([]));
    let message_id = event["message"]["id"].as_str().unwrap().to_string();
    assert_no_event(&mut bob, "new_message", 300).await;
    next_of(&mut alice, "new_message").await;

    // Reacting twice with the same emoji counts once
    for _ in 0..2 {
        send(
            &mut bob,
            json!({ "type": "reaction", "messageId": message_id, "emoji": "👍", "action": "add" }),
        )
        .await;
    }
    next_of(&mut alice, "reaction_update").await;
    let second = next_of(&mut alice, "reaction_update").await;
    assert_eq!(second["messageId"], message_id.as_str());
    assert_eq!(
        second["reactions"],
        json!([{ "emoji": "👍", "count": 1, "users": ["u2"] }])
    );

    // Only the author may edit
    send(
        &mut alice,
        json!({ "type": "edit_message", "messageId": message_id, "content": "hello world" }),
    )
    .await;
    for ws in [&mut alice, &mut bob] {
        let edited = next_of(ws, "message_edited").await;
        assert_eq!(edited["message"]["content"], "hello world");
        assert!(edited["message"]["editedAt"].is_string());
    }

    let mut carol = connect(server.addr).await;
    join(&mut carol, &channel, "u3", "carol").await;
    send(
        &mut carol,
        json!({
            "type": "edit_message",
            "requestId": "r-9",
            "messageId": message_id,
            "content": "carol was here"
        }),
    )
    .await;
    let err = next_of(&mut carol, "error").await;
    assert_eq!(err["kind"], "unauthorized");
    assert_eq!(err["requestId"], "r-9");
    assert_no_event(&mut alice, "message_edited", 300).await;
    assert_no_event(&mut bob, "message_edited", 100).await;

    let stored = server.service().get_message(&message_id).unwrap();
    assert_eq!(stored.content, "hello world");
}

#[tokio::test]
async fn reaction_removal_and_delete_flow() {
    let server = spawn_server(false).await;
    let (_, channel) = seed(&server);

    let mut alice = connect(server.addr).await;
    join(&mut alice, &channel, "u1", "alice").await;
    let mut bob = connect(server.addr).await;
    join(&mut bob, &channel, "u2", "bob").await;

    send(&mut alice, json!({ "type": "message", "content": "short lived" })).await;
    let event = next_of(&mut bob, "new_message").await;
    let message_id = event["message"]["id"].as_str().unwrap().to_string();

    let thumbs_up = json!({ "type": "reaction", "messageId": message_id, "emoji": "👍", "action": "add" });
    send(&mut alice, thumbs_up.clone()).await;
    next_of(&mut bob, "reaction_update").await;
    send(&mut bob, thumbs_up).await;
    let both = next_of(&mut bob, "reaction_update").await;
    assert_eq!(both["reactions"][0]["count"], 2);
    next_of(&mut alice, "reaction_update").await;
    next_of(&mut alice, "reaction_update").await;

    // The summary after a removal replaces the previous one
    send(
        &mut bob,
        json!({ "type": "reaction", "messageId": message_id, "emoji": "👍", "action": "remove" }),
    )
    .await;
    let update = next_of(&mut alice, "reaction_update").await;
    assert_eq!(
        update["reactions"],
        json!([{ "emoji": "👍", "count": 1, "users": ["u1"] }])
    );

    // Removing a reaction that is not there is not an error
    send(
        &mut bob,
        json!({
            "type": "reaction",
            "requestId": "r-3",
            "messageId": message_id,
            "emoji": "🎉",
            "action": "remove"
        }),
    )
    .await;
    let update = next_of(&mut alice, "reaction_update").await;
    assert_eq!(update["reactions"][0]["users"], json!(["u1"]));
    assert_no_event(&mut bob, "error", 300).await;

    // Only the author may delete
    send(
        &mut bob,
        json!({ "type": "delete_message", "requestId": "r-4", "messageId": message_id }),
    )
    .await;
    let err = next_of(&mut bob, "error").await;
    assert_eq!(err["kind"], "unauthorized");
    assert_eq!(err["requestId"], "r-4");
    assert_no_event(&mut alice, "message_deleted", 300).await;
    assert!(server.service().get_message(&message_id).is_ok());

    send(&mut alice, json!({ "type": "delete_message", "messageId": message_id })).await;
    for ws in [&mut alice, &mut bob] {
        let deleted = next_of(ws, "message_deleted").await;
        assert_eq!(deleted["messageId"], message_id.as_str());
    }
    let err = server.service().get_message(&message_id).unwrap_err();
    assert_eq!(err.kind().as_str(), "not_found");
}

#[tokio::test]
async fn frames_only_touch_the_joined_channel() {
    let server = spawn_server(false).await;
    let (community, general) = seed(&server);
    let random = server
        .service()
        .create_channel(&community, &Author::new("u1", "alice"), "random", hub_types::models::ChannelKind::Chat)
        .unwrap();

    let mut bob = connect(server.addr).await;
    join(&mut bob, &random.id, "u2", "bob").await;
    send(&mut bob, json!({ "type": "message", "content": "over here" })).await;
    let event = next_of(&mut bob, "new_message").await;
    let message_id = event["message"]["id"].as_str().unwrap().to_string();

    let mut carol = connect(server.addr).await;
    join(&mut carol, &general, "u3", "carol").await;
    let frames = [
        json!({ "type": "reaction", "messageId": message_id, "emoji": "👀", "action": "add" }),
        json!({ "type": "edit_message", "messageId": message_id, "content": "hijacked" }),
        json!({ "type": "delete_message", "messageId": message_id }),
    ];
    for frame in frames {
        send(&mut carol, frame).await;
        let err = next_of(&mut carol, "error").await;
        assert_eq!(err["kind"], "validation");
    }
    assert_no_event(&mut bob, "reaction_update", 300).await;

    let stored = server.service().get_message(&message_id).unwrap();
    assert_eq!(stored.content, "over here");
    let reactions = server
        .service()
        .list_messages(&random.id, 50, None)
        .unwrap()
        .remove(0)
        .reactions;
    assert!(reactions.is_empty());
}

#[tokio::test]
async fn online_flag_spans_every_channel_of_the_community() {
    let server = spawn_server(false).await;
    let (community, general) = seed(&server);
    let random = server
        .service()
        .create_channel(&community, &Author::new("u1", "alice"), "random", hub_types::models::ChannelKind::Chat)
        .unwrap();
    let bob_online = |server: &TestServer| {
        server
            .service()
            .list_members(&community)
            .unwrap()
            .into_iter()
            .find(|m| m.user_id == "u2")
            .unwrap()
            .is_online
    };

    let mut alice = connect(server.addr).await;
    join(&mut alice, &general, "u1", "alice").await;
    let mut carol = connect(server.addr).await;
    join(&mut carol, &random.id, "u3", "carol").await;

    let mut bob_general = connect(server.addr).await;
    join_in(&mut bob_general, &general, &community, "u2", "bob").await;
    let mut bob_random = connect(server.addr).await;
    join_in(&mut bob_random, &random.id, &community, "u2", "bob").await;
    assert!(bob_online(&server));

    drop(bob_general);
    let left = next_of(&mut alice, "user_left").await;
    assert_eq!(left["userId"], "u2");
    assert!(bob_online(&server));

    drop(bob_random);
    let left = next_of(&mut carol, "user_left").await;
    assert_eq!(left["userId"], "u2");
    assert!(!bob_online(&server));
}

#[tokio::test]
async fn typing_skips_every_connection_of_the_typist() {
    let server = spawn_server(false).await;
    let (_, channel) = seed(&server);

    let mut alice_a = connect(server.addr).await;
    join(&mut alice_a, &channel, "u1", "alice").await;
    let mut alice_b = connect(server.addr).await;
    join(&mut alice_b, &channel, "u1", "alice").await;
    let mut bob = connect(server.addr).await;
    join(&mut bob, &channel, "u2", "bob").await;

    send(&mut alice_a, json!({ "type": "typing" })).await;
    let typing = next_of(&mut bob, "typing").await;
    assert_eq!(typing["userId"], "u1");
    assert_eq!(typing["username"], "alice");
    assert_no_event(&mut alice_b, "typing", 300).await;
    assert_no_event(&mut alice_a, "typing", 100).await;
}

#[tokio::test]
async fn failures_reach_only_the_acting_connection() {
    let server = spawn_server(false).await;
    let (community, channel) = seed(&server);

    let mut bob = connect(server.addr).await;

    send(&mut bob, json!({ "type": "message", "requestId": "r-1", "content": "early" })).await;
    let err = next_of(&mut bob, "error").await;
    assert_eq!(err["kind"], "unauthorized");
    assert_eq!(err["requestId"], "r-1");

    send_raw(&mut bob, "{not json").await;
    let err = next_of(&mut bob, "error").await;
    assert_eq!(err["kind"], "validation");

    send(&mut bob, json!({ "type": "teleport", "requestId": "r-2" })).await;
    let err = next_of(&mut bob, "error").await;
    assert_eq!(err["kind"], "validation");
    assert_eq!(err["requestId"], "r-2");

    send(
        &mut bob,
        json!({ "type": "join", "channelId": "nope", "userId": "u2", "username": "bob" }),
    )
    .await;
    let err = next_of(&mut bob, "error").await;
    assert_eq!(err["kind"], "not_found");

    let presence = join(&mut bob, &channel, "u2", "bob").await;
    assert_eq!(presence["users"][0]["userId"], "u2");

    let mut alice = connect(server.addr).await;
    join(&mut alice, &channel, "u1", "alice").await;

    send(&mut bob, json!({ "type": "message", "content": "   " })).await;
    let err = next_of(&mut bob, "error").await;
    assert_eq!(err["kind"], "validation");
    send(&mut bob, json!({ "type": "delete_message", "messageId": "missing" })).await;
    let err = next_of(&mut bob, "error").await;
    assert_eq!(err["kind"], "not_found");
    assert_no_event(&mut alice, "error", 300).await;

    // The connection survives its errors
    send(&mut bob, json!({ "type": "message", "content": "still here" })).await;
    let event = next_of(&mut alice, "new_message").await;
    assert_eq!(event["message"]["content"], "still here");

    // Joining with the community marks the member online until the last connection leaves
    let mut carol = connect(server.addr).await;
    send(
        &mut carol,
        json!({
            "type": "join",
            "channelId": channel,
            "communityId": community,
            "userId": "u3",
            "username": "carol"
        }),
    )
    .await;
    next_of(&mut carol, "presence").await;
    let members = server.service().list_members(&community).unwrap();
    let carol_row = members.iter().find(|m| m.user_id == "u3").unwrap();
    assert!(carol_row.is_online);

    drop(carol);
    let left = next_of(&mut alice, "user_left").await;
    assert_eq!(left["userId"], "u3");
    let members = server.service().list_members(&community).unwrap();
    let carol_row = members.iter().find(|m| m.user_id == "u3").unwrap();
    assert!(!carol_row.is_online);
    assert!(carol_row.last_seen_at.is_some());
}

#[tokio::test]
async fn rejoining_moves_the_connection() {
    let server = spawn_server(false).await;
    let (community, general) = seed(&server);
    let other = server
        .service()
        .create_channel(&community, &Author::new("u1", "alice"), "random", hub_types::models::ChannelKind::Chat)
        .unwrap();

    let mut alice = connect(server.addr).await;
    join(&mut alice, &general, "u1", "alice").await;
    let mut bob = connect(server.addr).await;
    join(&mut bob, &general, "u2", "bob").await;
    next_of(&mut alice, "user_joined").await;

    join(&mut bob, &other.id, "u2", "bob").await;
    let left = next_of(&mut alice, "user_left").await;
    assert_eq!(left["userId"], "u2");

    send(&mut alice, json!({ "type": "message", "content": "anyone?" })).await;
    next_of(&mut alice, "new_message").await;
    assert_no_event(&mut bob, "new_message", 300).await;
}

#[tokio::test]
async fn sessions_can_be_required() {
    let server = spawn_server(true).await;
    let (_, channel) = seed(&server);
    let client = reqwest::Client::new();
    let (user_id, token) = register(&client, &server, "dora").await;

    let mut ws = connect(server.addr).await;
    send(
        &mut ws,
        json!({ "type": "join", "channelId": channel, "userId": "u1", "username": "alice" }),
    )
    .await;
    let err = next_of(&mut ws, "error").await;
    assert_eq!(err["kind"], "unauthorized");

    // The token's identity wins over the asserted one
    send(
        &mut ws,
        json!({
            "type": "join",
            "channelId": channel,
            "userId": "u1",
            "username": "alice",
            "token": token
        }),
    )
    .await;
    let presence = next_of(&mut ws, "presence").await;
    assert_eq!(presence["users"], json!([{ "userId": user_id, "username": "dora" }]));

    // A token alone is enough
    let mut second = connect(server.addr).await;
    send(
        &mut second,
        json!({ "type": "join", "channelId": channel, "token": token }),
    )
    .await;
    let presence = next_of(&mut second, "presence").await;
    assert_eq!(presence["users"], json!([{ "userId": user_id, "username": "dora" }]));
}
