//! Run-as identity reconciliation.
//!
//! Decides which identities the server and the applications it manages run
//! as. The decision is a pure function of the process identity, the sudo
//! invoker and whether reconciliation is enabled, so every branch is
//! testable regardless of how the crate was built. Builds with the
//! `privilege-reconcile` feature enable it; all others record the current
//! identity for both roles.

use crate::context::{BootstrapContext, Identity};

/// Whether this build reconciles identities.
pub const RECONCILE_ENABLED: bool = cfg!(feature = "privilege-reconcile");

/// Identities recorded in the device record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunAsPlan {
    /// Identity of the server process.
    pub server: Identity,
    /// Identity of managed applications.
    pub apps: Identity,
}

/// Compute the run-as plan.
///
/// | enabled | root | sudo invoker | server | apps    |
/// |---------|------|--------------|--------|---------|
/// | no      | any  | any          | current| current |
/// | yes     | yes  | present      | root   | invoker |
/// | yes     | yes  | absent       | root   | root    |
/// | yes     | no   | any          | current| current |
#[must_use]
pub fn reconcile(current: Identity, sudo_invoker: Option<Identity>, enabled: bool) -> RunAsPlan {
    match (enabled, current.is_root(), sudo_invoker) {
        (true, true, Some(invoker)) => RunAsPlan {
            server: Identity::ROOT,
            apps: invoker,
        },
        (true, true, None) => RunAsPlan {
            server: Identity::ROOT,
            apps: Identity::ROOT,
        },
        _ => RunAsPlan {
            server: current,
            apps: current,
        },
    }
}

/// Compute the run-as plan for this process using the build's setting.
#[must_use]
pub fn plan_for(ctx: &BootstrapContext) -> RunAsPlan {
    reconcile(ctx.identity(), ctx.sudo_invoker(), RECONCILE_ENABLED)
}
