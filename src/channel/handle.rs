//! Playable audio handed from the channel to whatever plays it.
//!
//! Remote handles are just the URL the render service gave us.  Local
//! handles point at a buffer owned by the [`AudioStore`]; the store keeps the
//! only strong reference, so revoking a handle really frees the bytes even if
//! a stale [`LocalAudio`] is still lying around somewhere.
use std::{
    io::Cursor,
    sync::{Arc, Weak},
};

use log::debug;

use crate::common::box_error::BoxError;

pub const WAV_MEDIA_TYPE: &str = "audio/wav";
const LOCATOR_PREFIX: &str = "blob:fuzzymix/";

#[derive(Debug, Clone)]
pub struct LocalAudio {
    locator: String,
    len: usize,
    data: Weak<[u8]>,
}

impl LocalAudio {
    /// Locally scoped identifier, unique for the life of the store.
    pub fn locator(&self) -> &str {
        &self.locator
    }
    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    pub fn media_type(&self) -> &'static str {
        WAV_MEDIA_TYPE
    }
    pub fn is_revoked(&self) -> bool {
        self.data.strong_count() == 0
    }
    /// The audio bytes, or None once the handle has been revoked.
    ///
    /// A player may hold the returned Arc while it plays; the buffer is
    /// freed when the store has revoked it and the last player lets go.
    pub fn bytes(&self) -> Option<Arc<[u8]>> {
        self.data.upgrade()
    }
    /// Read the WAV header of the buffer.
    pub fn wav_spec(&self) -> Result<hound::WavSpec, BoxError> {
        let data = self.bytes().ok_or("audio handle has been revoked")?;
        let reader = hound::WavReader::new(Cursor::new(&data[..]))?;
        Ok(reader.spec())
    }
}

#[derive(Debug, Clone)]
pub enum PlayableHandle {
    /// Direct reference from the service, nothing allocated here.
    Remote(String),
    Local(LocalAudio),
}

impl PlayableHandle {
    /// What to give a player: the remote URL or the local locator.
    pub fn locator(&self) -> &str {
        match self {
            PlayableHandle::Remote(url) => url,
            PlayableHandle::Local(local) => local.locator(),
        }
    }
    pub fn is_local(&self) -> bool {
        matches!(self, PlayableHandle::Local(_))
    }
    pub fn as_local(&self) -> Option<&LocalAudio> {
        match self {
            PlayableHandle::Local(local) => Some(local),
            PlayableHandle::Remote(_) => None,
        }
    }
}

/// Owner of locally allocated audio.  Holds at most one live buffer.
pub struct AudioStore {
    next_id: u64,
    live: Option<(String, Arc<[u8]>)>,
    released: u64,
}

impl Default for AudioStore {
    fn default() -> Self {
        AudioStore::new()
    }
}

impl AudioStore {
    pub fn new() -> AudioStore {
        AudioStore {
            next_id: 0,
            live: None,
            released: 0,
        }
    }

    /// Revoke the current buffer, then take ownership of `bytes` as the new one.
    pub fn publish(&mut self, bytes: Vec<u8>) -> LocalAudio {
        self.revoke();
        self.next_id += 1;
        let locator = format!("{}{}", LOCATOR_PREFIX, self.next_id);
        let data: Arc<[u8]> = Arc::from(bytes);
        let handle = LocalAudio {
            locator: locator.clone(),
            len: data.len(),
            data: Arc::downgrade(&data),
        };
        debug!("handle::publish - {} holds {} bytes", locator, handle.len);
        self.live = Some((locator, data));
        handle
    }

    /// Release the live buffer, if any.
    pub fn revoke(&mut self) {
        if let Some((locator, _data)) = self.live.take() {
            debug!("handle::revoke - released {}", locator);
            self.released += 1;
        }
    }

    pub fn live_count(&self) -> usize {
        usize::from(self.live.is_some())
    }
    pub fn released_count(&self) -> u64 {
        self.released
    }
}

impl Drop for AudioStore {
    fn drop(&mut self) {
        self.revoke();
    }
}
