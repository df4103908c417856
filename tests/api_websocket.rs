//! Integration tests per il canale live WebSocket
//!
//! Test per:
//! - Identificazione della sessione e snapshot di presenza
//! - Consegna live di messaggi diretti, buzz di society e di gruppo
//! - Cancellazione per tutti propagata ai partecipanti
//! - Frame malformati ed eventi prima dell'identificazione
//! - Notifiche di presenza alla connessione e alla chiusura
//!
//! Ogni test avvia il server su una porta libera e usa un vero client tokio-tungstenite.

mod common;

#[cfg(test)]
mod ws_tests {
    use super::common::*;
    use buzz_server::repositories::{Create, NewGroup};
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{Value, json};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

    type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn connect(addr: SocketAddr) -> Ws {
        let (ws, _) = connect_async(format!("ws://{}/ws", addr))
            .await
            .expect("Failed to connect WebSocket");
        ws
    }

    async fn send(ws: &mut Ws, event: Value) {
        ws.send(Message::Text(event.to_string()))
            .await
            .expect("Failed to send frame");
    }

    /// Prossimo evento JSON, oppure None se non arriva nulla entro `wait`
    async fn next_event(ws: &mut Ws, wait: Duration) -> Option<Value> {
        loop {
            match tokio::time::timeout(wait, ws.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    return Some(serde_json::from_str(&text).expect("server sent invalid json"));
                }
                Ok(Some(Ok(_))) => continue,
                _ => return None,
            }
        }
    }

    /// Attende il primo evento del tipo indicato, scartando gli altri
    async fn wait_for(ws: &mut Ws, event_type: &str) -> Value {
        loop {
            let event = next_event(ws, Duration::from_secs(3))
                .await
                .unwrap_or_else(|| panic!("no `{}` event received", event_type));
            if event["type"] == event_type {
                return event["data"].clone();
            }
        }
    }

    /// Verifica che nessun evento del tipo indicato arrivi entro un breve intervallo
    async fn assert_no_event(ws: &mut Ws, event_type: &str) {
        while let Some(event) = next_event(ws, Duration::from_millis(300)).await {
            assert_ne!(event["type"], event_type, "unexpected event: {}", event);
        }
    }

    async fn identify(ws: &mut Ws, user_id: &str, society_id: &str) -> Value {
        send(
            ws,
            json!({ "type": "identify", "data": { "token": create_test_jwt(user_id, society_id) } }),
        )
        .await;
        let identified = wait_for(ws, "identified").await;
        wait_for(ws, "presence_snapshot").await;
        identified
    }

    fn direct(peer_id: &str, content: &str) -> Value {
        json!({
            "type": "send_message",
            "data": { "scope": { "kind": "direct", "peer_id": peer_id }, "content": content }
        })
    }

    // ============================================================
    // WF1 identificazione
    // ============================================================

    #[tokio::test]
    async fn test_wf1_identify_returns_identity_and_presence() {
        let state = create_test_state().await;
        let addr = spawn_test_server(state.clone()).await;
        let mut alice = connect(addr).await;

        send(
            &mut alice,
            json!({ "type": "identify", "data": { "token": create_test_jwt("alice", "s1") } }),
        )
        .await;

        let identified = wait_for(&mut alice, "identified").await;
        assert_eq!(identified["user_id"], "alice");
        assert_eq!(identified["society_id"], "s1");

        let snapshot = wait_for(&mut alice, "presence_snapshot").await;
        assert_eq!(snapshot[0]["user_id"], "alice");
        assert_eq!(snapshot[0]["is_online"], true);
        assert!(state.presence.is_online("alice"));
    }

    #[tokio::test]
    async fn test_wf1_invalid_token_and_early_events_are_rejected() {
        let state = create_test_state().await;
        let addr = spawn_test_server(state.clone()).await;
        let mut ws = connect(addr).await;

        send(&mut ws, direct("bob", "too early")).await;
        let error = wait_for(&mut ws, "error").await;
        assert_eq!(error["kind"], "unauthenticated");

        send(&mut ws, json!({ "type": "identify", "data": { "token": "garbage" } })).await;
        let error = wait_for(&mut ws, "error").await;
        assert_eq!(error["kind"], "unauthenticated");
        assert!(!state.presence.is_online("alice"));

        // la connessione resta utilizzabile
        let identified = identify(&mut ws, "alice", "s1").await;
        assert_eq!(identified["user_id"], "alice");
    }

    #[tokio::test]
    async fn test_wf1_malformed_frames_do_not_close_the_session() {
        let state = create_test_state().await;
        let addr = spawn_test_server(state).await;
        let mut alice = connect(addr).await;
        identify(&mut alice, "alice", "s1").await;

        for frame in ["{ this is not valid json at all }", "[1, 2, 3]", "42", r#"{"type":"typing"}"#] {
            alice
                .send(Message::Text(frame.to_string()))
                .await
                .expect("send");
            let error = wait_for(&mut alice, "error").await;
            assert_eq!(error["kind"], "validation");
        }

        send(&mut alice, json!({ "type": "identify", "data": { "token": create_test_jwt("alice", "s1") } })).await;
        let error = wait_for(&mut alice, "error").await;
        assert_eq!(error["kind"], "validation");
    }

    // ============================================================
    // WF2 consegna messaggi
    // ============================================================

    #[tokio::test]
    async fn test_wf2_direct_message_reaches_both_participants() {
        let state = create_test_state().await;
        let addr = spawn_test_server(state).await;
        let mut alice = connect(addr).await;
        let mut bob = connect(addr).await;
        let mut carol = connect(addr).await;
        identify(&mut alice, "alice", "s1").await;
        identify(&mut bob, "bob", "s1").await;
        identify(&mut carol, "carol", "s1").await;

        send(&mut alice, direct("bob", "Hi Bob!")).await;

        let received = wait_for(&mut bob, "message_received").await;
        assert_eq!(received["content"], "Hi Bob!");
        assert_eq!(received["sender_id"], "alice");

        let echoed = wait_for(&mut alice, "message_received").await;
        assert_eq!(echoed["message_id"], received["message_id"]);

        assert_no_event(&mut carol, "message_received").await;
    }

    #[tokio::test]
    async fn test_wf2_society_buzz_stays_in_society() {
        let state = create_test_state().await;
        let addr = spawn_test_server(state).await;
        let mut alice = connect(addr).await;
        let mut bob = connect(addr).await;
        let mut dave = connect(addr).await;
        identify(&mut alice, "alice", "s1").await;
        identify(&mut bob, "bob", "s1").await;
        identify(&mut dave, "dave", "s2").await;

        send(
            &mut alice,
            json!({
                "type": "send_message",
                "data": { "scope": { "kind": "society", "society_id": "s1" }, "content": "Diwali party at 7" }
            }),
        )
        .await;

        let received = wait_for(&mut bob, "message_received").await;
        assert_eq!(received["scope"]["society_id"], "s1");
        assert_no_event(&mut dave, "message_received").await;

        // buzz verso un'altra society
        send(
            &mut alice,
            json!({
                "type": "send_message",
                "data": { "scope": { "kind": "society", "society_id": "s2" }, "content": "hello s2" }
            }),
        )
        .await;
        let error = wait_for(&mut alice, "error").await;
        assert_eq!(error["kind"], "authorization");
        assert_no_event(&mut dave, "message_received").await;
    }

    #[tokio::test]
    async fn test_wf2_group_buzz_reaches_only_members() {
        let state = create_test_state().await;
        let group = state
            .group
            .create(&NewGroup {
                name: "Block A".into(),
                society_id: "s1".into(),
                created_by: "alice".into(),
                members: ["alice".to_string(), "bob".to_string()].into(),
            })
            .await
            .expect("group");
        let addr = spawn_test_server(state).await;
        let mut alice = connect(addr).await;
        let mut bob = connect(addr).await;
        let mut carol = connect(addr).await;
        identify(&mut alice, "alice", "s1").await;
        identify(&mut bob, "bob", "s1").await;
        identify(&mut carol, "carol", "s1").await;

        send(
            &mut alice,
            json!({
                "type": "send_message",
                "data": {
                    "scope": { "kind": "group", "society_id": "s1", "group_id": group.group_id },
                    "content": "Block A meeting"
                }
            }),
        )
        .await;

        let received = wait_for(&mut bob, "message_received").await;
        assert_eq!(received["content"], "Block A meeting");
        assert_no_event(&mut carol, "message_received").await;
    }

    // ============================================================
    // WF3 cancellazione
    // ============================================================

    #[tokio::test]
    async fn test_wf3_delete_for_everyone_is_broadcast() {
        let state = create_test_state().await;
        let addr = spawn_test_server(state).await;
        let mut alice = connect(addr).await;
        let mut bob = connect(addr).await;
        identify(&mut alice, "alice", "s1").await;
        identify(&mut bob, "bob", "s1").await;

        send(&mut alice, direct("bob", "wrong chat")).await;
        let received = wait_for(&mut bob, "message_received").await;
        let message_id = received["message_id"].clone();

        // bob non è il mittente
        send(
            &mut bob,
            json!({ "type": "delete_message", "data": { "message_id": message_id, "mode": "for_everyone" } }),
        )
        .await;
        let error = wait_for(&mut bob, "error").await;
        assert_eq!(error["kind"], "authorization");

        send(
            &mut alice,
            json!({ "type": "delete_message", "data": { "message_id": message_id, "mode": "for_everyone" } }),
        )
        .await;
        let deleted = wait_for(&mut bob, "message_deleted").await;
        assert_eq!(deleted["mode"], "for_everyone");
        assert_eq!(deleted["message_id"], message_id);
        assert_eq!(deleted["message"]["deleted_for_all"], true);
        assert_eq!(deleted["message"]["content"], "This message was deleted");
    }

    #[tokio::test]
    async fn test_wf3_delete_for_me_is_private() {
        let state = create_test_state().await;
        let addr = spawn_test_server(state).await;
        let mut alice = connect(addr).await;
        let mut bob = connect(addr).await;
        identify(&mut alice, "alice", "s1").await;
        identify(&mut bob, "bob", "s1").await;

        send(&mut alice, direct("bob", "just for me")).await;
        let received = wait_for(&mut bob, "message_received").await;
        wait_for(&mut alice, "message_received").await;

        send(
            &mut bob,
            json!({ "type": "delete_message", "data": { "message_id": received["message_id"], "mode": "for_me" } }),
        )
        .await;
        let deleted = wait_for(&mut bob, "message_deleted").await;
        assert_eq!(deleted["mode"], "for_me");
        assert!(deleted.get("message").is_none());

        assert_no_event(&mut alice, "message_deleted").await;
    }

    // ============================================================
    // WF4 presenza e lettura
    // ============================================================

    #[tokio::test]
    async fn test_wf4_presence_changes_are_broadcast() {
        let state = create_test_state().await;
        let addr = spawn_test_server(state.clone()).await;
        let mut alice = connect(addr).await;
        identify(&mut alice, "alice", "s1").await;

        let mut bob = connect(addr).await;
        identify(&mut bob, "bob", "s1").await;

        let online = wait_for(&mut alice, "presence_changed").await;
        // la prima notifica può essere quella di alice stessa
        let online = if online["user_id"] == "alice" {
            wait_for(&mut alice, "presence_changed").await
        } else {
            online
        };
        assert_eq!(online["user_id"], "bob");
        assert_eq!(online["is_online"], true);

        bob.close(None).await.expect("close");

        let offline = wait_for(&mut alice, "presence_changed").await;
        assert_eq!(offline["user_id"], "bob");
        assert_eq!(offline["is_online"], false);
        assert!(offline["last_seen"].is_string());
        assert!(!state.presence.is_online("bob"));
    }

    #[tokio::test]
    async fn test_wf4_second_session_keeps_user_online() {
        let state = create_test_state().await;
        let addr = spawn_test_server(state.clone()).await;
        let mut phone = connect(addr).await;
        let mut laptop = connect(addr).await;
        identify(&mut phone, "alice", "s1").await;
        identify(&mut laptop, "alice", "s1").await;
        assert_eq!(state.presence.session_count("alice"), 2);

        phone.close(None).await.expect("close");
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(state.presence.is_online("alice"));
        assert_eq!(state.presence.session_count("alice"), 1);
    }

    #[tokio::test]
    async fn test_wf4_closed_sessions_release_their_rooms() {
        let state = create_test_state().await;
        let addr = spawn_test_server(state.clone()).await;
        let mut alice = connect(addr).await;
        identify(&mut alice, "alice", "s1").await;
        // everyone, user:alice, society:s1
        assert_eq!(state.rooms.room_count(), 3);

        for i in 0..5 {
            let mut ws = connect(addr).await;
            identify(&mut ws, &format!("resident{}", i), &format!("s{}", i + 10)).await;
            ws.close(None).await.expect("close");
        }

        let mut rooms = state.rooms.room_count();
        for _ in 0..30 {
            if rooms == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            rooms = state.rooms.room_count();
        }
        assert_eq!(rooms, 3);
        assert_eq!(state.presence.session_count("resident0"), 0);
        assert!(state.presence.is_online("alice"));
    }

    #[tokio::test]
    async fn test_wf4_mark_seen_notifies_sender() {
        let state = create_test_state().await;
        let addr = spawn_test_server(state).await;
        let mut alice = connect(addr).await;
        let mut bob = connect(addr).await;
        identify(&mut alice, "alice", "s1").await;
        identify(&mut bob, "bob", "s1").await;

        send(&mut alice, direct("bob", "did you read this?")).await;
        wait_for(&mut bob, "message_received").await;

        send(&mut bob, json!({ "type": "mark_seen", "data": { "peer_id": "alice" } })).await;
        let seen = wait_for(&mut alice, "messages_seen").await;
        assert_eq!(seen["by"], "bob");
        assert_eq!(seen["count"], 1);
    }
}
