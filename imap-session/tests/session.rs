use std::sync::Arc;

use mailbox_model::memory::MemoryMailboxSet;
use mailbox_model::{AppendMessage, Flag, MailboxSet, Message};

use imap_session::{single_uid_set, Session, StoreMode};

fn msg(body: &str) -> AppendMessage {
    AppendMessage {
        content: body.as_bytes().to_vec(),
        flags: vec![],
        internal_date: None,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test]
async fn select_on_a_fresh_mailbox_is_empty() {
    init_tracing();
    let mailboxes = Arc::new(MemoryMailboxSet::with_inbox('/').await);
    let mut session = Session::new(mailboxes);

    let report = session.select("INBOX", false).await.unwrap();
    assert_eq!(report.refresh.exists, 0);
    assert_eq!(report.refresh.recent, 0);
    assert!(!report.readonly);
}

#[tokio::test]
async fn append_is_recent_when_nobody_has_the_mailbox_open() {
    let mailboxes = Arc::new(MemoryMailboxSet::with_inbox('/').await);
    let mut session = Session::new(mailboxes.clone());

    let appended = session.append("INBOX", msg("hello")).await.unwrap();
    assert_eq!(appended.uid.get(), 1);

    let mut selector = Session::new(mailboxes);
    let report = selector.select("INBOX", false).await.unwrap();
    assert_eq!(report.refresh.exists, 1);
    assert_eq!(report.refresh.recent, 1);
}

#[tokio::test]
async fn a_second_session_sees_an_append_but_does_not_own_the_recent_bit() {
    let mailboxes = Arc::new(MemoryMailboxSet::with_inbox('/').await);
    let mut alice = Session::new(mailboxes.clone());
    let mut bob = Session::new(mailboxes.clone());

    alice.select("INBOX", false).await.unwrap();
    bob.select("INBOX", false).await.unwrap();

    let appended = alice.append("INBOX", msg("hi bob")).await.unwrap();

    // Bob's own view is stale until he checks; he sees the message,
    // but since Alice already had the mailbox open, the backend never
    // marked it recent, and ownership landed on Alice's view instead
    // (§8: "with a concurrent view ... session A's recent-set contains
    // the UID", never session B's).
    let report = bob.check_mailbox(None, true).await.unwrap();
    assert_eq!(report.exists, 1);
    assert_eq!(report.recent, 0);

    let alice_view = alice
        .fetch(&single_uid_set(appended.uid), true, false)
        .await
        .unwrap();
    assert!(alice_view[0].recent);

    let bob_view = bob
        .fetch(&single_uid_set(appended.uid), true, false)
        .await
        .unwrap();
    assert!(!bob_view[0].recent);
}

#[tokio::test]
async fn search_evaluates_a_compound_not_or_query() {
    let mailboxes = Arc::new(MemoryMailboxSet::with_inbox('/').await);
    let mut session = Session::new(mailboxes);

    session
        .append("INBOX", msg("Subject: weekly digest\r\n\r\nshort"))
        .await
        .unwrap();
    session
        .append(
            "INBOX",
            AppendMessage {
                content: format!("Subject: weekly digest\r\n\r\n{}", "x".repeat(2000)).into_bytes(),
                flags: vec![],
                internal_date: None,
            },
        )
        .await
        .unwrap();
    session
        .append(
            "INBOX",
            AppendMessage {
                content: b"Subject: urgent\r\n\r\nshort".to_vec(),
                flags: vec![Flag::seen()],
                internal_date: None,
            },
        )
        .await
        .unwrap();

    session.select("INBOX", false).await.unwrap();

    let hits = session
        .search(false, br#"UNSEEN NOT (LARGER 1024 OR SUBJECT "urgent")"#)
        .await
        .unwrap();
    assert_eq!(hits, vec![1]);
}

#[tokio::test]
async fn store_and_expunge_remove_deleted_messages() {
    let mailboxes = Arc::new(MemoryMailboxSet::with_inbox('/').await);
    let mut session = Session::new(mailboxes);

    session.append("INBOX", msg("one")).await.unwrap();
    session.append("INBOX", msg("two")).await.unwrap();
    session.select("INBOX", false).await.unwrap();

    let stored = session
        .store(
            &mailbox_model::SequenceSet::single(std::num::NonZeroU32::new(1).unwrap()),
            false,
            StoreMode::Add,
            &[Flag::deleted()],
        )
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].flags.contains(&Flag::deleted()));

    let expunged = session.expunge().await.unwrap();
    assert_eq!(expunged, vec![1]);

    let remaining = session
        .fetch(&mailbox_model::SequenceSet::all(), false, false)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].uid.get(), 2);
}

#[tokio::test]
async fn list_matches_hierarchy_wildcards() {
    let mailboxes = Arc::new(MemoryMailboxSet::with_inbox('/').await);
    mailboxes.add_mailbox("Work/Inbox").await.unwrap();
    mailboxes.add_mailbox("Work/Archive").await.unwrap();
    mailboxes.add_mailbox("Personal").await.unwrap();

    let session = Session::new(mailboxes);

    let under_work = session.list("", "Work/%", false).await.unwrap();
    let mut names: Vec<_> = under_work.into_iter().map(|e| e.name).collect();
    names.sort();
    assert_eq!(names, vec!["Work/Archive".to_string(), "Work/Inbox".to_string()]);

    let everything = session.list("", "*", false).await.unwrap();
    assert_eq!(everything.len(), 4);
    assert!(everything.iter().all(|e| e.attrs.is_empty()));
}

#[tokio::test]
async fn list_with_empty_pattern_is_the_delimiter_probe() {
    let mailboxes = Arc::new(MemoryMailboxSet::with_inbox('/').await);
    mailboxes.add_mailbox("Work").await.unwrap();
    let session = Session::new(mailboxes);

    let probe = session.list("", "", false).await.unwrap();
    assert_eq!(probe.len(), 1);
    assert_eq!(probe[0].name, "");
    assert_eq!(probe[0].delimiter, '/');
    assert_eq!(probe[0].attrs, vec![imap_session::Attribute::Noselect]);
}

#[tokio::test]
async fn subscribe_resolves_inbox_first() {
    let mailboxes = Arc::new(MemoryMailboxSet::with_inbox('/').await);
    mailboxes.add_mailbox("Work").await.unwrap();
    let session = Session::new(mailboxes.clone());

    session.set_subscribed("Work", true).await.unwrap();
    let subscribed = session.list("", "*", true).await.unwrap();
    assert_eq!(subscribed.len(), 1);
    assert_eq!(subscribed[0].name, "Work");
}

#[tokio::test]
async fn append_to_a_readonly_mailbox_fails() {
    let mailboxes = Arc::new(MemoryMailboxSet::with_inbox('/').await);
    mailboxes.add_readonly_mailbox("Shared").await;
    let mut session = Session::new(mailboxes);

    let err = session.append("Shared", msg("nope")).await.unwrap_err();
    assert!(matches!(err, imap_session::Error::ReadOnly));
}

#[tokio::test]
async fn store_and_expunge_fail_on_an_examined_view() {
    let mailboxes = Arc::new(MemoryMailboxSet::with_inbox('/').await);
    let mut session = Session::new(mailboxes);

    session.append("INBOX", msg("one")).await.unwrap();
    session.select("INBOX", true).await.unwrap();

    let err = session
        .store(
            &mailbox_model::SequenceSet::all(),
            false,
            StoreMode::Add,
            &[Flag::deleted()],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, imap_session::Error::ReadOnly));

    let err = session.expunge().await.unwrap_err();
    assert!(matches!(err, imap_session::Error::ReadOnly));
}

#[tokio::test]
async fn fetch_sets_seen_unless_peeking() {
    let mailboxes = Arc::new(MemoryMailboxSet::with_inbox('/').await);
    let mut session = Session::new(mailboxes);

    session.append("INBOX", msg("one")).await.unwrap();
    session.select("INBOX", false).await.unwrap();

    let peeked = session
        .fetch(&mailbox_model::SequenceSet::all(), false, false)
        .await
        .unwrap();
    assert!(!peeked[0].message.permanent_flags().contains(&Flag::seen()));

    let seen = session
        .fetch(&mailbox_model::SequenceSet::all(), false, true)
        .await
        .unwrap();
    assert!(seen[0].message.permanent_flags().contains(&Flag::seen()));
}

#[tokio::test]
async fn copy_assigns_new_uids_in_the_destination() {
    let mailboxes = Arc::new(MemoryMailboxSet::with_inbox('/').await);
    mailboxes.add_mailbox("Archive").await.unwrap();
    let mut session = Session::new(mailboxes);

    session.append("INBOX", msg("keep me")).await.unwrap();
    session.select("INBOX", false).await.unwrap();

    let report = session
        .copy(&mailbox_model::SequenceSet::all(), false, "Archive")
        .await
        .unwrap();
    assert_eq!(report.mapping.len(), 1);
    assert_eq!(report.mapping[0].1.get(), 1);
}
