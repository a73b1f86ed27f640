//! Tests for turn orchestration, history invariants, and the session
//! manager's queued serialization.

mod common;

use std::sync::Arc;

use futures::StreamExt;
use pretty_assertions::assert_eq;

use common::{ScriptedProvider, Step};
use confab::error::ConfabError;
use confab::provider::echo::EchoProvider;
use confab::resilience::{ResilientProvider, RetryPolicy};
use confab::session::context::ContextWindow;
use confab::session::manager::SessionManager;
use confab::session::{ChatSession, Session, TurnEvent};
use confab::transcript::{MemoryTranscriptStore, TranscriptStore};
use confab::types::{Message, Role};

fn echo_chat() -> ChatSession {
    let provider = Arc::new(ResilientProvider::new(
        Arc::new(EchoProvider::new()),
        RetryPolicy::default(),
    ));
    ChatSession::new(Session::new("Be brief."), provider)
}

fn roles(history: &[Message]) -> Vec<Role> {
    history.iter().map(|m| m.role).collect()
}

#[tokio::test]
async fn sequential_turns_keep_history_in_exact_order() {
    let mut chat = echo_chat();

    let first = chat.run_turn("a").await.unwrap();
    let second = chat.run_turn("b").await.unwrap();

    let history = chat.history();
    assert_eq!(
        roles(history),
        vec![
            Role::System,
            Role::User,
            Role::Assistant,
            Role::User,
            Role::Assistant
        ]
    );
    assert_eq!(history[1].content, "a");
    assert_eq!(history[2].content, first.reply);
    assert_eq!(history[3].content, "b");
    assert_eq!(history[4].content, second.reply);
}

#[tokio::test]
async fn failed_turn_keeps_only_the_user_message() {
    let provider = Arc::new(ScriptedProvider::new(vec![Step::AuthFail]));
    let mut chat = ChatSession::new(Session::new("sys"), provider);

    let error = chat.run_turn("hi").await.unwrap_err();
    assert!(matches!(error, ConfabError::Auth(_)));

    let history = chat.history();
    assert_eq!(roles(history), vec![Role::System, Role::User]);
    assert_eq!(history[1].content, "hi");
}

#[tokio::test]
async fn session_stays_usable_after_a_failed_turn() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Step::FatalFail,
        Step::Reply("second time lucky"),
    ]));
    let mut chat = ChatSession::new(Session::new("sys"), provider);

    chat.run_turn("first").await.unwrap_err();
    let outcome = chat.run_turn("again").await.unwrap();

    assert_eq!(outcome.reply, "second time lucky");
    assert_eq!(
        roles(chat.history()),
        vec![Role::System, Role::User, Role::User, Role::Assistant]
    );
}

#[tokio::test]
async fn stream_turn_appends_assistant_message_after_drain() {
    let mut chat = echo_chat();

    let mut reply = String::new();
    let mut completed = None;
    {
        let stream = chat.stream_turn("hello there");
        futures::pin_mut!(stream);
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                TurnEvent::Delta(text) => reply.push_str(&text),
                TurnEvent::Notice(_) => {}
                TurnEvent::Completed(outcome) => completed = Some(outcome),
            }
        }
    }

    let outcome = completed.expect("stream must end with a Completed event");
    assert_eq!(outcome.reply, reply);
    let history = chat.history();
    assert_eq!(roles(history), vec![Role::System, Role::User, Role::Assistant]);
    assert_eq!(history[2].content, reply);
}

#[tokio::test]
async fn interrupted_stream_discards_partial_text_by_default() {
    let provider = Arc::new(ScriptedProvider::new(vec![Step::StreamThenFail(vec![
        "Hel", "lo",
    ])]));
    let wrapped = Arc::new(ResilientProvider::new(provider, RetryPolicy::default()));
    let mut chat = ChatSession::new(Session::new("sys"), wrapped);

    let mut saw_interrupt = false;
    {
        let stream = chat.stream_turn("hi");
        futures::pin_mut!(stream);
        while let Some(event) = stream.next().await {
            if let Err(ConfabError::StreamInterrupted { partial, .. }) = event {
                assert_eq!(partial, "Hello");
                saw_interrupt = true;
            }
        }
    }

    assert!(saw_interrupt);
    assert_eq!(roles(chat.history()), vec![Role::System, Role::User]);
}

#[tokio::test]
async fn interrupted_stream_keeps_partial_text_when_configured() {
    let provider = Arc::new(ScriptedProvider::new(vec![Step::StreamThenFail(vec![
        "Hel", "lo",
    ])]));
    let wrapped = Arc::new(ResilientProvider::new(provider, RetryPolicy::default()));
    let mut chat = ChatSession::new(Session::new("sys"), wrapped).keep_partial_replies(true);

    {
        let stream = chat.stream_turn("hi");
        futures::pin_mut!(stream);
        while stream.next().await.is_some() {}
    }

    let history = chat.history();
    assert_eq!(roles(history), vec![Role::System, Role::User, Role::Assistant]);
    assert_eq!(history[2].content, "Hello");
}

#[tokio::test]
async fn cancelled_stream_turn_leaves_only_the_user_message() {
    let mut chat = echo_chat();

    {
        let stream = chat.stream_turn("hello");
        futures::pin_mut!(stream);
        // Pull one delta, then drop the stream mid-turn.
        let first = stream.next().await;
        assert!(first.is_some());
    }

    assert_eq!(roles(chat.history()), vec![Role::System, Role::User]);
}

struct FailingStore;

impl TranscriptStore for FailingStore {
    fn append(&self, _session_id: &str, _message: &Message) -> Result<(), ConfabError> {
        Err(ConfabError::Persistence("disk full".into()))
    }

    fn load_history(&self, _session_id: &str) -> Result<Vec<Message>, ConfabError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn persistence_failure_warns_but_does_not_fail_the_turn() {
    let provider = Arc::new(ScriptedProvider::new(vec![Step::Reply("ok")]));
    let mut chat =
        ChatSession::new(Session::new("sys"), provider).with_transcript_store(Arc::new(FailingStore));

    let outcome = chat.run_turn("hi").await.unwrap();

    assert_eq!(outcome.reply, "ok");
    assert!(!outcome.warnings.is_empty());
    assert!(outcome.warnings[0].contains("disk full"));
    // In-memory history updates regardless.
    assert_eq!(
        roles(chat.history()),
        vec![Role::System, Role::User, Role::Assistant]
    );
}

#[tokio::test]
async fn turns_are_archived_to_the_transcript_store() {
    let store = Arc::new(MemoryTranscriptStore::new());
    let provider = Arc::new(ScriptedProvider::new(vec![Step::Reply("hey")]));
    let mut chat = ChatSession::new(Session::new("sys"), provider)
        .with_transcript_store(store.clone());

    chat.run_turn("hi").await.unwrap();

    let archived = store.load_history(chat.id()).unwrap();
    assert_eq!(roles(&archived), vec![Role::User, Role::Assistant]);
}

// --- session manager ------------------------------------------------------

fn echo_manager() -> SessionManager {
    let provider = Arc::new(ResilientProvider::new(
        Arc::new(EchoProvider::new()),
        RetryPolicy::default(),
    ));
    SessionManager::new(provider, "Be brief.")
}

#[tokio::test]
async fn manager_rejects_turns_for_unknown_sessions() {
    let manager = echo_manager();
    let error = manager.run_turn("no-such-id", "hi").await.unwrap_err();
    assert!(matches!(error, ConfabError::Config(_)));
}

#[tokio::test]
async fn concurrent_turns_on_one_session_queue_instead_of_interleaving() {
    let manager = Arc::new(echo_manager());
    let id = manager.create_session(None).unwrap();

    let m1 = Arc::clone(&manager);
    let m2 = Arc::clone(&manager);
    let id1 = id.clone();
    let id2 = id.clone();
    let t1 = tokio::spawn(async move { m1.run_turn(&id1, "a").await });
    let t2 = tokio::spawn(async move { m2.run_turn(&id2, "b").await });
    t1.await.unwrap().unwrap();
    t2.await.unwrap().unwrap();

    let chat = manager.session(&id).unwrap();
    let chat = chat.lock().await;
    // Whichever turn ran first, each completed fully before the other began.
    assert_eq!(
        roles(chat.history()),
        vec![
            Role::System,
            Role::User,
            Role::Assistant,
            Role::User,
            Role::Assistant
        ]
    );
}

#[tokio::test]
async fn manager_resumes_history_from_the_transcript_store() {
    let store = Arc::new(MemoryTranscriptStore::new());
    store.append("prior", &Message::user("old question")).unwrap();
    store
        .append("prior", &Message::assistant("old answer"))
        .unwrap();

    let manager = echo_manager().with_transcript_store(store);
    let id = manager.create_session(Some("prior")).unwrap();
    assert_eq!(id, "prior");

    let chat = manager.session(&id).unwrap();
    let chat = chat.lock().await;
    // The system prompt is re-seeded at index 0 ahead of restored history.
    assert_eq!(
        roles(chat.history()),
        vec![Role::System, Role::User, Role::Assistant]
    );
}

#[tokio::test]
async fn manager_requires_a_store_to_resume() {
    let manager = echo_manager();
    let error = manager.create_session(Some("prior")).unwrap_err();
    assert!(matches!(error, ConfabError::Config(_)));
}

// --- context window -------------------------------------------------------

fn long_history(turns: usize) -> Vec<Message> {
    let mut messages = vec![Message::system("sys")];
    for i in 0..turns {
        messages.push(Message::user(format!("question {i} {}", "x".repeat(400))));
        messages.push(Message::assistant(format!("answer {i} {}", "y".repeat(400))));
    }
    messages
}

#[test]
fn context_window_is_a_no_op_under_budget() {
    let window = ContextWindow::new(100_000);
    let messages = long_history(3);
    assert_eq!(window.fit(&messages), messages);
}

#[test]
fn context_window_drops_oldest_turns_first_and_keeps_system() {
    let window = ContextWindow {
        max_input_tokens: 1200,
        response_reserve_tokens: 100,
        keep_last_n: 4,
    };
    let messages = long_history(10);
    let fitted = window.fit(&messages);

    assert_eq!(fitted[0].role, Role::System);
    assert!(fitted.len() < messages.len());
    // The most recent messages survive verbatim.
    let tail = &messages[messages.len() - 4..];
    assert_eq!(&fitted[fitted.len() - 4..], tail);
    // Oldest non-system messages are the ones that went.
    assert!(!fitted.iter().any(|m| m.content.starts_with("question 0")));
}
