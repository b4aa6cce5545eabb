//! Integration tests for StateManager: tabs, debug modal, session log and events
//!
//! These tests verify:
//! - Tab switching always logs and leaves exactly one view visible
//! - The debug modal open/close sequences
//! - Log entries stay in append order across threads, and export matches them
//! - Subscribers receive change events

use proptest::prelude::*;
use qrlens::services::export_log;
use qrlens::{SessionInfo, StateChange, StateManager, Tab};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tokio::time::{timeout, Duration};

fn messages(state: &StateManager) -> Vec<String> {
    state
        .debug_log()
        .entries()
        .into_iter()
        .map(|e| e.message)
        .collect()
}

#[test]
fn test_show_parse_twice() {
    let state = StateManager::new();

    state.show_tab(Tab::Parse);
    state.show_tab(Tab::Parse);

    assert_eq!(state.read(|s| s.active_tab), Tab::Parse);
    assert!(!state.read(|s| s.is_tab_visible(Tab::Generate)));
    assert_eq!(
        messages(&state),
        vec!["用户切换了板块：parse", "用户切换了板块：parse"]
    );
}

#[test]
fn test_modal_sequences() {
    let state = StateManager::new();

    state.open_debug_modal();
    state.close_debug_modal();

    assert_eq!(
        messages(&state),
        vec![
            "用户点击了查看调试按钮",
            "正在打开调试...",
            "调试框打开成功",
            "用户点击了关闭按钮",
            "正在关闭调试...",
            "调试框关闭成功",
        ]
    );
    assert!(!state.read(|s| s.debug_modal_visible));
}

#[tokio::test]
async fn test_tab_change_event_delivered() {
    let state = StateManager::new();
    let mut rx = state.subscribe();

    state.show_tab(Tab::Parse);

    let event = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed");
    assert_eq!(event, StateChange::TabChanged { tab: Tab::Parse });

    let event = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed");
    assert!(
        matches!(event, StateChange::LogAppended(ref entry) if entry.message == "用户切换了板块：parse"),
        "Expected LogAppended event, got: {:?}",
        event
    );
}

#[tokio::test]
async fn test_multiple_subscribers_receive_modal_event() {
    let state = StateManager::new();
    let mut rx1 = state.subscribe();
    let mut rx2 = state.subscribe();

    state.update(|s| s.debug_modal_visible = true);

    for rx in [&mut rx1, &mut rx2] {
        let event = timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("Timeout waiting for event")
            .expect("Channel closed");
        assert_eq!(event, StateChange::DebugModalToggled { visible: true });
    }
}

#[test]
fn test_concurrent_logging_keeps_every_entry() {
    let state = Arc::new(StateManager::new());
    let mut handles = Vec::new();

    for thread in 0..4 {
        let state = Arc::clone(&state);
        handles.push(std::thread::spawn(move || {
            for i in 0..50 {
                state.log(format!("thread {} entry {}", thread, i));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let entries = messages(&state);
    assert_eq!(entries.len(), 200);

    // Per-thread order is preserved
    for thread in 0..4 {
        let prefix = format!("thread {} ", thread);
        let own: Vec<&String> = entries.iter().filter(|m| m.starts_with(&prefix)).collect();
        for (i, message) in own.iter().enumerate() {
            assert_eq!(**message, format!("thread {} entry {}", thread, i));
        }
    }
}

#[test]
fn test_broadcast_order_matches_log_order() {
    let state = Arc::new(StateManager::new());
    let mut rx = state.subscribe();

    let writers: Vec<_> = (0..3)
        .map(|thread| {
            let state = Arc::clone(&state);
            std::thread::spawn(move || {
                for i in 0..20 {
                    state.log(format!("{}-{}", thread, i));
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let mut broadcast = Vec::new();
    while let Ok(StateChange::LogAppended(entry)) = rx.try_recv() {
        broadcast.push(entry.message);
    }
    assert_eq!(broadcast, messages(&state));
}

#[test]
fn test_startup_banner_then_export() {
    let dir = TempDir::new().unwrap();
    let target = camino::Utf8PathBuf::try_from(dir.path().join("debug-log.log")).unwrap();
    let state = StateManager::new();
    state.begin_session(&SessionInfo::current(Instant::now()));

    export_log(&state, || Some(target.clone())).unwrap();

    let written = std::fs::read_to_string(&target).unwrap();
    assert!(written.starts_with('['));
    assert!(written.contains("] 用户打开了应用"));
    assert!(written.contains("] ------------------------------"));
    assert!(written.ends_with("] 用户点击了下载日志文件按钮"));
}

proptest! {
    #[test]
    fn prop_export_is_newline_join(messages in prop::collection::vec("[a-z0-9 ]{0,12}", 0..20)) {
        let state = StateManager::new();
        for message in &messages {
            state.log(message.clone());
        }

        let entries = state.debug_log().entries();
        let recorded: Vec<String> = entries.iter().map(|e| e.message.clone()).collect();
        prop_assert_eq!(&recorded, &messages);

        let expected = entries
            .iter()
            .map(|e| format!("[{}] {}", e.timestamp, e.message))
            .collect::<Vec<_>>()
            .join("\n");
        prop_assert_eq!(state.export_log(), expected);
    }
}
