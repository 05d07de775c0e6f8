// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Default priority for the audio callback thread.
pub const DEFAULT_CALLBACK_THREAD_PRIORITY: u8 = 70;

/// Raises the priority of whichever thread first calls [`CallbackPriority::apply_once`].
/// Backends own their callback threads, so this runs from inside the first callback.
#[derive(Debug, Clone)]
pub struct CallbackPriority {
    priority: Option<ThreadPriorityValue>,
    realtime: bool,
    applied: bool,
}

impl CallbackPriority {
    /// `priority` is 0-99. Anything else disables the priority change.
    pub fn new(priority: u8, realtime: bool) -> Self {
        let priority = if priority < 100 {
            ThreadPriorityValue::try_from(priority).ok()
        } else {
            None
        };
        Self {
            priority,
            realtime,
            applied: false,
        }
    }

    pub fn priority(&self) -> Option<ThreadPriorityValue> {
        self.priority
    }

    pub fn is_applied(&self) -> bool {
        self.applied
    }

    /// Applies the priority to the current thread the first time it is called.
    pub fn apply_once(&mut self) {
        if self.applied {
            return;
        }
        self.applied = true;
        let Some(priority) = self.priority else {
            return;
        };

        let tp = ThreadPriority::Crossplatform(priority);
        let _ = set_current_thread_priority(tp);

        #[cfg(unix)]
        if self.realtime {
            use thread_priority::unix::{
                set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
                ThreadSchedulePolicy,
            };
            match set_thread_priority_and_policy(
                thread_native_id(),
                tp,
                ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
            ) {
                Ok(()) => info!("Enabled RT SCHED_FIFO for audio callback thread"),
                Err(e) => warn!(
                    error = %e,
                    "Failed to set RT SCHED_FIFO for audio callback thread"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_range() {
        assert!(CallbackPriority::new(DEFAULT_CALLBACK_THREAD_PRIORITY, false)
            .priority()
            .is_some());
        assert!(CallbackPriority::new(0, false).priority().is_some());
        assert!(CallbackPriority::new(100, false).priority().is_none());
    }

    #[test]
    fn test_disabled_priority_still_marks_applied() {
        let mut priority = CallbackPriority::new(200, true);
        assert!(!priority.is_applied());
        priority.apply_once();
        assert!(priority.is_applied());
    }
}
