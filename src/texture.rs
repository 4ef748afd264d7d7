// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Identity and lifetime bookkeeping shared by every managed texture.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Process-wide unique texture identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl TextureId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TextureId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TextureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "texture#{}", self.0)
    }
}

type DeleteObserver = Box<dyn FnOnce(TextureId) + Send>;

/// Identity, the persistent flag and delete observers.
///
/// Embedded in [`RgbTexture`](crate::rgb_texture::RgbTexture).  The owning texture calls
/// [`notify_deleted`](Self::notify_deleted) from its destructor before it releases its surface.
pub struct TextureBase {
    id: TextureId,
    persistent: AtomicBool,
    observers: Mutex<Vec<DeleteObserver>>,
}

impl Debug for TextureBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureBase")
            .field("id", &self.id)
            .field("persistent", &self.is_persistent())
            .finish_non_exhaustive()
    }
}

impl TextureBase {
    pub(crate) fn new() -> Self {
        TextureBase {
            id: TextureId::next(),
            persistent: AtomicBool::new(false),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    /// Persistent textures survive device-resource cleanup.
    pub fn is_persistent(&self) -> bool {
        self.persistent.load(Ordering::Relaxed)
    }

    pub fn set_persistent(&self, persistent: bool) {
        self.persistent.store(persistent, Ordering::Relaxed);
    }

    /// Registers a callback that runs once when the texture is destroyed.
    pub fn on_delete<F: FnOnce(TextureId) + Send + 'static>(&self, observer: F) {
        self.observers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Box::new(observer));
    }

    /// Runs and forgets every observer.
    pub(crate) fn notify_deleted(&mut self) {
        let observers = std::mem::take(
            self.observers
                .get_mut()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        for observer in observers {
            observer(self.id);
        }
    }
}
