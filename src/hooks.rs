// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Caller hooks: completion callback, group-change hook and ad-server
//! targeting reporter.

use std::sync::Arc;

use crate::record::{Eid, Group};

/// Completion callback, invoked exactly once per `get_id` with the eids the
/// caller may use.
pub type PartnerCallback = Box<dyn FnOnce(Vec<Eid>) + Send + 'static>;

/// Invoked with the current group at start and on every server directive.
pub type GroupChangedHook = Arc<dyn Fn(Group) + Send + Sync>;

/// Ad-server key/value targeting (GAM-style `setTargeting`).
pub trait TargetingReporter: Send + Sync {
    fn set_targeting(&self, key: &str, value: &str);
}

#[derive(Default)]
pub struct Hooks {
    pub callback: Option<PartnerCallback>,
    pub group_changed: Option<GroupChangedHook>,
    pub targeting: Option<Arc<dyn TargetingReporter>>,
}

impl Hooks {
    #[must_use]
    pub fn with_callback(callback: impl FnOnce(Vec<Eid>) + Send + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn on_group_changed(mut self, hook: impl Fn(Group) + Send + Sync + 'static) -> Self {
        self.group_changed = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn report_to(mut self, reporter: Arc<dyn TargetingReporter>) -> Self {
        self.targeting = Some(reporter);
        self
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("callback", &self.callback.is_some())
            .field("group_changed", &self.group_changed.is_some())
            .field("targeting", &self.targeting.is_some())
            .finish()
    }
}

/// Group notifications split off from [`Hooks`] so they can outlive the
/// one-shot callback.
#[derive(Clone)]
pub struct GroupNotifier {
    group_changed: Option<GroupChangedHook>,
    targeting: Option<Arc<dyn TargetingReporter>>,
    parameter_name: String,
}

impl GroupNotifier {
    pub fn new(
        group_changed: Option<GroupChangedHook>,
        targeting: Option<Arc<dyn TargetingReporter>>,
        parameter_name: impl Into<String>,
    ) -> Self {
        Self {
            group_changed,
            targeting,
            parameter_name: parameter_name.into(),
        }
    }

    /// Report the group to the ad server.
    pub fn report(&self, group: Group) {
        if let Some(ref targeting) = self.targeting {
            targeting.set_targeting(&self.parameter_name, group.as_str());
        }
    }

    /// Invoke the group-change hook.
    pub fn changed(&self, group: Group) {
        if let Some(ref hook) = self.group_changed {
            hook(group);
        }
    }
}
