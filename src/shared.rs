/*
 *  shared.rs
 *
 *  LyMatrix - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Live configuration cell shared by the receiver and the render loop
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use log::debug;
use tokio::sync::Notify;

use crate::scenes::Configuration;

/// Owned configuration state.
///
/// Writers replace the whole configuration by swapping an `Arc` under the
/// lock, so a reader only ever sees a complete prior or current value. The
/// changed flag is the dirty signal the render loop polls; it is set on every
/// publish and cleared by the render loop when it restarts.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<Inner>,
}

struct Inner {
    current: RwLock<Arc<Configuration>>,
    changed: AtomicBool,
    generation: AtomicU64,
    notify: Notify,
}

impl SharedConfig {
    pub fn new(initial: Configuration) -> Self {
        Self {
            inner: Arc::new(Inner {
                current: RwLock::new(Arc::new(initial)),
                changed: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                notify: Notify::new(),
            }),
        }
    }

    /// Replace the live configuration (last write wins) and raise the changed flag
    pub fn publish(&self, config: Configuration) -> u64 {
        let next = Arc::new(config);
        {
            let mut current = self.inner.current.write().unwrap_or_else(|e| e.into_inner());
            *current = next;
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.changed.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
        debug!("Published configuration generation {}", generation);
        generation
    }

    /// The current configuration; cheap, never blocks on a render
    pub fn snapshot(&self) -> Arc<Configuration> {
        let current = self.inner.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&current)
    }

    pub fn is_changed(&self) -> bool {
        self.inner.changed.load(Ordering::Acquire)
    }

    pub fn clear_changed(&self) {
        self.inner.changed.store(false, Ordering::Release);
    }

    /// Number of publishes so far
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Resolves once the changed flag is raised (immediately if it already is)
    pub async fn wait_for_change(&self) {
        loop {
            // register before checking so a publish in between is not lost
            let notified = self.inner.notify.notified();
            if self.is_changed() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenes::Scene;
    use std::time::Duration;

    fn config_with(text: &str) -> Configuration {
        let mut config = Configuration::welcome();
        config.data.scenes = vec![Scene::scrolling_text(text)];
        config
    }

    #[test]
    fn test_publish_replaces_and_flags() {
        let shared = SharedConfig::new(Configuration::welcome());
        assert!(!shared.is_changed());
        assert_eq!(shared.generation(), 0);

        let before = shared.snapshot();
        assert_eq!(shared.publish(config_with("next")), 1);

        assert!(shared.is_changed());
        assert_eq!(shared.snapshot().data.scenes[0].content.value(), "next");
        // earlier snapshots are untouched by the swap
        assert_eq!(before.data.scenes[0].content.value(), "Welcome!");

        shared.clear_changed();
        assert!(!shared.is_changed());
    }

    #[test]
    fn test_last_write_wins() {
        let shared = SharedConfig::new(Configuration::default());
        shared.publish(config_with("a"));
        shared.publish(config_with("b"));
        assert_eq!(shared.snapshot().data.scenes[0].content.value(), "b");
        assert_eq!(shared.generation(), 2);
    }

    #[tokio::test]
    async fn test_wait_for_change_wakes_on_publish() {
        let shared = SharedConfig::new(Configuration::default());
        let waiter = {
            let shared = shared.clone();
            tokio::spawn(async move { shared.wait_for_change().await })
        };
        tokio::task::yield_now().await;
        shared.publish(config_with("x"));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_change_returns_when_already_flagged() {
        let shared = SharedConfig::new(Configuration::default());
        shared.publish(config_with("x"));
        tokio::time::timeout(Duration::from_millis(100), shared.wait_for_change())
            .await
            .expect("flag already raised");
    }
}
