//! Pieces shared by every store: the shared-state handle and the
//! loading/error bookkeeping wrapped around each operation.

use irrigation_api::ApiResult;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type Shared<S> = Arc<RwLock<S>>;

// ---------------------------------------------------------------------------
// Operation status
// ---------------------------------------------------------------------------

/// `loading` is true while an operation is in flight; `error` holds the
/// last failure until the next operation starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpStatus {
    pub loading: bool,
    pub error: Option<String>,
}

impl OpStatus {
    pub(crate) fn begin(&mut self, show_loading: bool) {
        if show_loading {
            self.loading = true;
        }
        self.error = None;
    }

    pub(crate) fn fail(&mut self, op: &str, message: String) {
        warn!(op, error = %message, "store operation failed");
        self.error = Some(message);
    }
}

/// Implemented by every store's state struct.
pub trait Tracked {
    fn op_status(&mut self) -> &mut OpStatus;
    fn node_id(&self) -> &str;
}

/// True when `st` is still bound to the node a request was issued for.
/// Responses that arrive after a rebind are dropped by the caller.
pub(crate) fn still_bound<S: Tracked>(st: &S, issued_for: &str, op: &str) -> bool {
    if st.node_id() == issued_for {
        return true;
    }
    debug!(
        op,
        issued_for,
        current = st.node_id(),
        "discarding response for previous node"
    );
    false
}

/// Run `fut` between a begin/settle pair: `loading` is raised and `error`
/// cleared before, `loading` dropped and any error recorded after, whatever
/// the outcome. The settle is skipped when the store was rebound meanwhile.
/// The result is handed back untouched.
pub(crate) async fn tracked<S, T, F>(state: &Shared<S>, op: &'static str, fut: F) -> ApiResult<T>
where
    S: Tracked,
    F: Future<Output = ApiResult<T>>,
{
    let issued_for = {
        let mut st = state.write().await;
        st.op_status().begin(true);
        st.node_id().to_string()
    };

    let result = fut.await;

    let mut st = state.write().await;
    if !still_bound(&*st, &issued_for, op) {
        return result;
    }
    let status = st.op_status();
    if let Err(e) = &result {
        status.fail(op, e.to_string());
    }
    status.loading = false;
    result
}

// ===========================================================================
// Tests
// ===========================================================================
