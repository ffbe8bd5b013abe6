//! The wait/notify primitive behind IDLE and `check_mailbox` (§4.4).

use std::sync::Arc;
use std::time::Duration;

use mailbox_model::Mailbox;
use tokio::sync::Notify;

const POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Waits for the next change notification on `mailbox`, giving up
/// after 10s so an otherwise-silent IDLE still ticks over periodically
/// (§4.4) — long enough to avoid busy-waiting, short enough that a
/// client behind a NAT or proxy that drops quiet connections still
/// sees traffic. A timeout is not an error: the caller always follows
/// this with a `refresh`, so a notification missed by a hair makes no
/// difference to what gets reported.
pub async fn wait_for_update<Mbx: Mailbox>(mailbox: &Arc<Mbx>) {
    wait_for_update_or_cancel(mailbox, None).await
}

/// The "or-event" combinator of §4.4/§9: waits for *either* the
/// mailbox's own update event or a caller-supplied cancellation event
/// (e.g. the protocol layer tearing down IDLE early on a client
/// `DONE`), whichever fires first, bounded by the same 10s timeout.
/// Grounded on `aero-proto/src/imap/mailbox_view.rs::idle_sync`, which
/// already `tokio::select!`s between a stop-notify and a
/// mailbox-notify — generalized here into a reusable function rather
/// than inlined at the one call site, so `check_mailbox` and any future
/// caller share the same composition instead of each hand-rolling the
/// `select!`.
pub async fn wait_for_update_or_cancel<Mbx: Mailbox>(mailbox: &Arc<Mbx>, cancel: Option<&Notify>) {
    let updated = mailbox.selected_set().updated();
    let wait = async {
        match cancel {
            Some(cancel) => {
                tokio::select! {
                    _ = updated.notified() => {}
                    _ = cancel.notified() => {}
                }
            }
            None => updated.notified().await,
        }
    };
    let _ = tokio::time::timeout(POLL_TIMEOUT, wait).await;
}
