//! Optional process-wide hub slot
//!
//! Nothing inside the crate depends on it; it exists for call sites that
//! cannot thread a handle through. [`Hub::close`] empties the slot when it
//! still holds the closing hub, so a fresh hub can be installed afterwards.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::hub::Hub;

static HUB: Lazy<RwLock<Option<Arc<Hub>>>> = Lazy::new(|| RwLock::new(None));

/// Install `hub`, returning whichever hub was installed before
pub fn install(hub: Arc<Hub>) -> Option<Arc<Hub>> {
    HUB.write().replace(hub)
}

pub fn get() -> Option<Arc<Hub>> {
    HUB.read().clone()
}

pub(crate) fn release(hub: &Hub) {
    let mut slot = HUB.write();
    if slot
        .as_ref()
        .is_some_and(|installed| std::ptr::eq(Arc::as_ptr(installed), hub))
    {
        *slot = None;
    }
}
