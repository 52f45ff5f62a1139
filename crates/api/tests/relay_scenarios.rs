//! End-to-end engine scenarios driven through client events

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use supportdesk_api::{
    session::SessionStatus,
    websocket::events::{ClientEvent, ServerEvent},
    ChatEngine, EngineConfig,
};
use supportdesk_shared::{ConnectionId, MessageRole, Role};
use tokio::sync::mpsc::{self, UnboundedReceiver};

struct Client {
    id: ConnectionId,
    rx: UnboundedReceiver<ServerEvent>,
}

impl Client {
    async fn connect(engine: &ChatEngine) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = engine.connect(tx).await;
        let mut client = Self { id: conn.id, rx };
        assert!(matches!(&client.drain()[..], [ServerEvent::Connected { .. }]));
        client
    }

    fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Texts of every `new-message` received, in arrival order
    fn message_texts(&mut self) -> Vec<String> {
        self.drain()
            .into_iter()
            .filter_map(|e| match e {
                ServerEvent::NewMessage { message, .. } => Some(message.text),
                _ => None,
            })
            .collect()
    }
}

fn join(session_id: &str, name: &str, role: Role) -> ClientEvent {
    ClientEvent::JoinSession {
        session_id: Some(session_id.to_string()),
        display_name: name.to_string(),
        role,
    }
}

fn send(session_id: &str, text: &str) -> ClientEvent {
    ClientEvent::SendMessage {
        session_id: session_id.to_string(),
        text: text.to_string(),
        sender: None,
        role: None,
    }
}

#[tokio::test]
async fn test_owner_sees_unread_then_clears_it() {
    let engine = ChatEngine::default();
    let mut owner = Client::connect(&engine).await;
    engine
        .handle(owner.id, ClientEvent::OwnerSubscribe { display_name: "agent".into() })
        .await;
    assert!(matches!(&owner.drain()[..], [ServerEvent::SessionsList { sessions }] if sessions.is_empty()));

    // User A joins S1 and sees an empty history
    let mut alice = Client::connect(&engine).await;
    engine.handle(alice.id, join("S1", "alice", Role::User)).await;
    match &alice.drain()[0] {
        ServerEvent::MessageHistory { messages, .. } => assert!(messages.is_empty()),
        other => panic!("Expected MessageHistory, got {:?}", other),
    }
    owner.drain();

    engine.handle(alice.id, send("S1", "hello")).await;

    let events = owner.drain();
    let updated = events
        .iter()
        .find_map(|e| match e {
            ServerEvent::SessionUpdated { session } => Some(session.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(updated.session_id, "S1");
    assert_eq!(updated.unread_count, 1);
    assert_eq!(updated.label, "alice");
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::NewMessageNotification { session_id, message, .. }
            if session_id == "S1" && message.text == "hello"
    )));
    // The dashboard feed is not a participant of S1
    assert!(!events.iter().any(|e| matches!(e, ServerEvent::NewMessage { .. })));

    // Owner opens S1 on its own connection and marks it read
    let mut owner_chat = Client::connect(&engine).await;
    engine.handle(owner_chat.id, join("S1", "agent", Role::Owner)).await;
    match &owner_chat.drain()[0] {
        ServerEvent::MessageHistory { messages, .. } => {
            assert!(messages.iter().any(|m| m.text == "hello" && !m.read_by_owner));
        }
        other => panic!("Expected MessageHistory, got {:?}", other),
    }
    owner.drain();

    engine
        .handle(owner_chat.id, ClientEvent::MarkRead { session_id: "S1".into() })
        .await;
    let cleared = owner
        .drain()
        .into_iter()
        .find_map(|e| match e {
            ServerEvent::SessionUpdated { session } => Some(session),
            _ => None,
        })
        .unwrap();
    assert_eq!(cleared.unread_count, 0);

    // Idempotent
    engine
        .handle(owner_chat.id, ClientEvent::MarkRead { session_id: "S1".into() })
        .await;
    assert_eq!(engine.store().snapshot("S1").await.unwrap().unread_count, 0);
    assert!(engine.history("S1").await.unwrap().iter().all(|m| m.read_by_owner));
}

#[tokio::test]
async fn test_owner_reply_does_not_notify() {
    let engine = ChatEngine::default();
    let mut dashboard = Client::connect(&engine).await;
    engine
        .handle(dashboard.id, ClientEvent::OwnerSubscribe { display_name: "agent".into() })
        .await;

    let alice = Client::connect(&engine).await;
    let agent = Client::connect(&engine).await;
    engine.handle(alice.id, join("S1", "alice", Role::User)).await;
    engine.handle(agent.id, join("S1", "agent", Role::Owner)).await;
    dashboard.drain();

    engine.handle(agent.id, send("S1", "how can I help?")).await;

    let events = dashboard.drain();
    assert!(events.iter().any(|e| matches!(e, ServerEvent::SessionUpdated { session } if session.unread_count == 0)));
    assert!(!events.iter().any(|e| matches!(e, ServerEvent::NewMessageNotification { .. })));
}

#[tokio::test]
async fn test_two_users_share_a_session() {
    let engine = ChatEngine::default();
    let mut alice = Client::connect(&engine).await;
    let mut bob = Client::connect(&engine).await;

    tokio::join!(
        engine.handle(alice.id, join("S1", "alice", Role::User)),
        engine.handle(bob.id, join("S1", "bob", Role::User)),
    );
    alice.drain();
    bob.drain();

    engine.handle(alice.id, send("S1", "from alice")).await;
    engine.handle(bob.id, send("S1", "from bob")).await;

    let expected = vec!["from alice".to_string(), "from bob".to_string()];
    assert_eq!(alice.message_texts(), expected);
    assert_eq!(bob.message_texts(), expected);

    engine.disconnect(bob.id).await;
    let summary = engine.store().snapshot("S1").await.unwrap();
    assert_eq!(summary.status, SessionStatus::Active);
    assert_eq!(summary.participant_count, 1);
    assert_eq!(summary.label, "Multiple Users");
    assert_eq!(alice.message_texts(), vec!["bob left the chat".to_string()]);
}

#[tokio::test]
async fn test_concurrent_sends_observed_in_append_order() {
    let engine = ChatEngine::default();
    let mut watchers = Vec::new();
    for name in ["w1", "w2", "w3"] {
        let mut client = Client::connect(&engine).await;
        engine.handle(client.id, join("S1", name, Role::User)).await;
        client.drain();
        watchers.push(client);
    }
    for w in watchers.iter_mut() {
        w.drain();
    }

    let mut senders = Vec::new();
    for i in 0..4 {
        let client = Client::connect(&engine).await;
        engine.handle(client.id, join("S1", &format!("s{i}"), Role::User)).await;
        senders.push(client);
    }
    for w in watchers.iter_mut() {
        w.drain();
    }

    let mut tasks = Vec::new();
    for (i, sender) in senders.iter().enumerate() {
        let engine = engine.clone();
        let id = sender.id;
        tasks.push(tokio::spawn(async move {
            for n in 0..25 {
                engine.handle(id, send("S1", &format!("{i}-{n}"))).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let history: Vec<String> = engine
        .history("S1")
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.role == MessageRole::User)
        .map(|m| m.text)
        .collect();
    assert_eq!(history.len(), 100);

    let ids: Vec<u64> = engine.history("S1").await.unwrap().iter().map(|m| m.id).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    for watcher in watchers.iter_mut() {
        assert_eq!(watcher.message_texts(), history);
    }

    let summary = engine.store().snapshot("S1").await.unwrap();
    assert_eq!(summary.unread_count, 100);
}

#[tokio::test]
async fn test_join_then_disconnect_leaves_once_under_concurrent_joins() {
    let engine = ChatEngine::default();
    let flaky = Client::connect(&engine).await;
    let others: Vec<Client> = {
        let mut v = Vec::new();
        for _ in 0..5 {
            v.push(Client::connect(&engine).await);
        }
        v
    };

    engine.handle(flaky.id, join("S1", "flaky", Role::User)).await;

    let mut tasks = Vec::new();
    for (i, other) in others.iter().enumerate() {
        let engine = engine.clone();
        let id = other.id;
        tasks.push(tokio::spawn(async move {
            engine.handle(id, join("S1", &format!("user{i}"), Role::User)).await;
        }));
    }
    let disconnect = {
        let engine = engine.clone();
        let id = flaky.id;
        tokio::spawn(async move { engine.disconnect(id).await })
    };
    for task in tasks {
        task.await.unwrap();
    }
    disconnect.await.unwrap();
    // A duplicate transport close must not produce another notice
    engine.disconnect(flaky.id).await;

    let left = engine
        .history("S1")
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.text == "flaky left the chat")
        .count();
    assert_eq!(left, 1);

    let online = engine.presence().list_online("S1").await;
    assert_eq!(online.len(), 5);
    assert!(online.iter().all(|u| u.display_name != "flaky"));
    assert_eq!(engine.store().snapshot("S1").await.unwrap().participant_count, 5);

    for other in others {
        engine.disconnect(other.id).await;
    }
    let summary = engine.store().snapshot("S1").await.unwrap();
    assert_eq!(summary.participant_count, 0);
    assert_eq!(summary.status, SessionStatus::Inactive);
}

#[tokio::test]
async fn test_typing_indicator_expires_without_stop() {
    let engine = ChatEngine::new(EngineConfig {
        typing_timeout: Duration::from_millis(50),
        ..EngineConfig::default()
    });
    let mut alice = Client::connect(&engine).await;
    let mut agent = Client::connect(&engine).await;
    engine.handle(alice.id, join("S1", "alice", Role::User)).await;
    engine.handle(agent.id, join("S1", "agent", Role::Owner)).await;
    alice.drain();
    agent.drain();

    engine
        .handle(
            alice.id,
            ClientEvent::TypingStart {
                session_id: "S1".into(),
                display_name: "alice".into(),
            },
        )
        .await;

    assert_eq!(
        agent.drain(),
        vec![ServerEvent::UserTyping {
            session_id: "S1".into(),
            display_name: "alice".into(),
            is_typing: true,
        }]
    );
    // The typist does not hear about itself
    assert!(alice.drain().is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(engine.presence().typing("S1").await.is_empty());
    assert_eq!(
        agent.drain(),
        vec![ServerEvent::UserTyping {
            session_id: "S1".into(),
            display_name: "alice".into(),
            is_typing: false,
        }]
    );
}

#[tokio::test]
async fn test_typing_refresh_extends_indicator() {
    let engine = ChatEngine::new(EngineConfig {
        typing_timeout: Duration::from_millis(150),
        ..EngineConfig::default()
    });
    let alice = Client::connect(&engine).await;
    let mut agent = Client::connect(&engine).await;
    engine.handle(alice.id, join("S1", "alice", Role::User)).await;
    engine.handle(agent.id, join("S1", "agent", Role::Owner)).await;
    agent.drain();

    let start = || ClientEvent::TypingStart {
        session_id: "S1".into(),
        display_name: "alice".into(),
    };
    engine.handle(alice.id, start()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.handle(alice.id, start()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The original deadline passed but the refresh moved it
    assert_eq!(engine.presence().typing("S1").await, vec!["alice".to_string()]);
    let events = agent.drain();
    assert_eq!(events.len(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(engine.presence().typing("S1").await.is_empty());
}

#[tokio::test]
async fn test_repeated_typing_starts_expire_once() {
    let engine = ChatEngine::new(EngineConfig {
        typing_timeout: Duration::from_millis(50),
        ..EngineConfig::default()
    });
    let alice = Client::connect(&engine).await;
    let mut agent = Client::connect(&engine).await;
    engine.handle(alice.id, join("S1", "alice", Role::User)).await;
    engine.handle(agent.id, join("S1", "agent", Role::Owner)).await;
    agent.drain();

    for _ in 0..200 {
        engine
            .handle(
                alice.id,
                ClientEvent::TypingStart {
                    session_id: "S1".into(),
                    display_name: "alice".into(),
                },
            )
            .await;
    }
    tokio::time::sleep(Duration::from_millis(150)).await;

    let indicators: Vec<bool> = agent
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            ServerEvent::UserTyping { is_typing, .. } => Some(is_typing),
            _ => None,
        })
        .collect();
    assert_eq!(indicators, vec![true, false]);
    assert!(engine.presence().typing("S1").await.is_empty());
}

#[tokio::test]
async fn test_send_and_disconnect_clear_typing() {
    let engine = ChatEngine::default();
    let alice = Client::connect(&engine).await;
    let mut agent = Client::connect(&engine).await;
    engine.handle(alice.id, join("S1", "alice", Role::User)).await;
    engine.handle(agent.id, join("S1", "agent", Role::Owner)).await;

    let typing = |on: bool| {
        let session_id = "S1".to_string();
        let display_name = "alice".to_string();
        if on {
            ClientEvent::TypingStart { session_id, display_name }
        } else {
            ClientEvent::TypingStop { session_id, display_name }
        }
    };

    engine.handle(alice.id, typing(true)).await;
    agent.drain();
    engine.handle(alice.id, send("S1", "done typing")).await;
    let events = agent.drain();
    assert!(events.iter().any(|e| matches!(e, ServerEvent::UserTyping { is_typing: false, .. })));
    assert!(engine.presence().typing("S1").await.is_empty());

    engine.handle(alice.id, typing(true)).await;
    agent.drain();
    engine.disconnect(alice.id).await;
    let events = agent.drain();
    assert!(events.iter().any(|e| matches!(e, ServerEvent::UserTyping { is_typing: false, .. })));
    assert!(events.iter().any(|e| matches!(e, ServerEvent::UsersOnline { users, .. } if users.len() == 1)));

    // Explicit stop with nothing pending is silent
    let bob = Client::connect(&engine).await;
    engine.handle(bob.id, join("S1", "bob", Role::User)).await;
    agent.drain();
    engine
        .handle(
            bob.id,
            ClientEvent::TypingStop {
                session_id: "S1".into(),
                display_name: "bob".into(),
            },
        )
        .await;
    assert!(agent.drain().is_empty());
}

#[tokio::test]
async fn test_dead_participant_does_not_block_session() {
    let engine = ChatEngine::default();
    let dead = Client::connect(&engine).await;
    let mut live = Client::connect(&engine).await;
    engine.handle(dead.id, join("S1", "ghost", Role::User)).await;
    engine.handle(live.id, join("S1", "alice", Role::User)).await;
    live.drain();

    let dead_id = dead.id;
    drop(dead);

    engine.handle(live.id, send("S1", "still here")).await;
    assert_eq!(live.message_texts(), vec!["still here".to_string()]);

    engine.disconnect(dead_id).await;
    assert_eq!(engine.store().snapshot("S1").await.unwrap().participant_count, 1);
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let engine = Arc::new(ChatEngine::default());
    let mut s1 = Client::connect(&engine).await;
    let mut s2 = Client::connect(&engine).await;
    engine.handle(s1.id, join("S1", "alice", Role::User)).await;
    engine.handle(s2.id, join("S2", "bob", Role::User)).await;
    s1.drain();
    s2.drain();

    engine.handle(s1.id, send("S1", "only S1")).await;
    assert_eq!(s1.message_texts(), vec!["only S1".to_string()]);
    assert!(s2.message_texts().is_empty());

    let list = engine.list_sessions().await;
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].session_id, "S1");
    assert_eq!(list[0].unread_count, 1);
}
