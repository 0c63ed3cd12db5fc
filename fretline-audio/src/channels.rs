//! Synthesizer channel pool.
//!
//! Channel 0 sits outside the pool for note previews, and the
//! conventional percussion channel is never handed out. The allocator
//! owns the channel->instrument table and the track->channel bindings;
//! selecting the patch on a freshly allocated channel is the only synth
//! traffic it generates.

use std::collections::HashMap;
use std::sync::Arc;

use fretline_types::TrackId;

use crate::catalog::Catalog;
use crate::synth::{SynthCommand, SynthError, SynthProxy, SynthResult};

/// Channel reserved for previewing notes outside the pool.
pub const PREVIEW_CHANNEL: u8 = 0;

/// Channel conventionally reserved for percussion; never allocated.
pub const PERCUSSION_CHANNEL: u8 = 9;

/// Default channel count of the synth process.
pub const DEFAULT_CHANNEL_COUNT: u8 = 16;

pub struct ChannelAllocator {
    proxy: Arc<SynthProxy>,
    catalog: Catalog,
    capacity: u8,
    cursor: u8,
    free: Vec<u8>,
    /// channel -> instrument name currently selected on it
    assignments: HashMap<u8, String>,
    tracks: HashMap<TrackId, Vec<u8>>,
}

impl ChannelAllocator {
    pub fn new(proxy: Arc<SynthProxy>, catalog: Catalog, capacity: u8) -> Self {
        Self {
            proxy,
            catalog,
            capacity,
            cursor: PREVIEW_CHANNEL + 1,
            free: Vec::new(),
            assignments: HashMap::new(),
            tracks: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn proxy(&self) -> &Arc<SynthProxy> {
        &self.proxy
    }

    /// Allocate a channel and select `instrument_name` on it.
    ///
    /// Unknown names and pool exhaustion are hard errors; nothing is
    /// consumed from the pool when the lookup or the select fails.
    pub fn alloc(&mut self, instrument_name: &str) -> SynthResult<u8> {
        let spec = self
            .catalog
            .lookup(instrument_name)
            .ok_or_else(|| SynthError::UnknownInstrument(instrument_name.to_string()))?;

        let chan = self.next_channel().ok_or(SynthError::ChannelsExhausted)?;

        if let Err(e) = self.proxy.transact(SynthCommand::Select {
            chan,
            sfont: spec.sfont,
            bank: spec.bank,
            preset: spec.preset,
        }) {
            self.free.push(chan);
            return Err(e);
        }

        log::debug!(target: "synth", "channel {} -> {}", chan, instrument_name);
        self.assignments.insert(chan, instrument_name.to_string());
        Ok(chan)
    }

    fn next_channel(&mut self) -> Option<u8> {
        if let Some(chan) = self.free.pop() {
            return Some(chan);
        }
        if self.cursor == PERCUSSION_CHANNEL {
            self.cursor += 1;
        }
        if self.cursor >= self.capacity {
            return None;
        }
        let chan = self.cursor;
        self.cursor += 1;
        Some(chan)
    }

    /// Return a channel to the pool. Other allocations are untouched.
    pub fn free(&mut self, chan: u8) {
        if chan == PREVIEW_CHANNEL || chan == PERCUSSION_CHANNEL {
            return;
        }
        if self.assignments.remove(&chan).is_some() {
            self.free.push(chan);
        }
    }

    /// Rewind the pool for a fresh session. The reserved channels stay
    /// reserved.
    pub fn reset(&mut self) {
        self.cursor = PREVIEW_CHANNEL + 1;
        self.free.clear();
        self.assignments.clear();
        self.tracks.clear();
    }

    /// Instrument currently selected on a channel, if any.
    pub fn assignment(&self, chan: u8) -> Option<&str> {
        self.assignments.get(&chan).map(|s| s.as_str())
    }

    /// Record which channels belong to a track.
    pub fn bind_track(&mut self, track: TrackId, channels: Vec<u8>) {
        self.tracks.insert(track, channels);
    }

    /// Free every channel bound to a track.
    pub fn release_track(&mut self, track: TrackId) {
        if let Some(channels) = self.tracks.remove(&track) {
            for chan in channels {
                self.free(chan);
            }
        }
    }

    pub fn track_channels(&self, track: TrackId) -> Option<&[u8]> {
        self.tracks.get(&track).map(|v| v.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InstrumentSpec;
    use crate::synth::{SharedTestBackend, TestBackend, TestOp};
    use std::time::Duration;

    fn make_allocator(capacity: u8) -> (ChannelAllocator, Arc<TestBackend>, Arc<SynthProxy>) {
        let backend = Arc::new(TestBackend::new());
        let proxy = Arc::new(SynthProxy::spawn(Box::new(SharedTestBackend(backend.clone()))));
        let catalog = Catalog::from_entries(vec![
            ("Steel Guitar".to_string(), InstrumentSpec { sfont: 1, bank: 0, preset: 25 }),
            ("Fingered Bass".to_string(), InstrumentSpec { sfont: 1, bank: 0, preset: 33 }),
        ]);
        let allocator = ChannelAllocator::new(proxy.clone(), catalog, capacity);
        (allocator, backend, proxy)
    }

    #[test]
    fn allocation_starts_past_the_preview_channel() {
        let (mut alloc, backend, proxy) = make_allocator(DEFAULT_CHANNEL_COUNT);
        let chan = alloc.alloc("Steel Guitar").unwrap();
        assert_eq!(chan, 1);
        assert_eq!(
            backend.operations(),
            vec![TestOp::Select { chan: 1, sfont: 1, bank: 0, preset: 25 }]
        );
        proxy.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn percussion_channel_is_never_allocated() {
        let (mut alloc, _backend, proxy) = make_allocator(DEFAULT_CHANNEL_COUNT);
        let mut seen = Vec::new();
        while let Ok(chan) = alloc.alloc("Steel Guitar") {
            seen.push(chan);
        }
        assert!(!seen.contains(&PERCUSSION_CHANNEL));
        assert!(!seen.contains(&PREVIEW_CHANNEL));
        // 16 channels minus preview and percussion
        assert_eq!(seen.len(), 14);
        proxy.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn exhaustion_is_a_hard_error() {
        let (mut alloc, _backend, proxy) = make_allocator(3);
        alloc.alloc("Steel Guitar").unwrap();
        alloc.alloc("Steel Guitar").unwrap();
        let err = alloc.alloc("Steel Guitar").unwrap_err();
        assert!(matches!(err, SynthError::ChannelsExhausted));
        proxy.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn unknown_instrument_is_a_lookup_error_and_consumes_nothing() {
        let (mut alloc, backend, proxy) = make_allocator(DEFAULT_CHANNEL_COUNT);
        let err = alloc.alloc("Theremin").unwrap_err();
        assert!(matches!(err, SynthError::UnknownInstrument(_)));
        assert!(backend.operations().is_empty());
        // The next allocation still gets the first channel.
        assert_eq!(alloc.alloc("Steel Guitar").unwrap(), 1);
        proxy.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn freed_channels_are_reused() {
        let (mut alloc, _backend, proxy) = make_allocator(DEFAULT_CHANNEL_COUNT);
        let a = alloc.alloc("Steel Guitar").unwrap();
        let b = alloc.alloc("Fingered Bass").unwrap();
        assert_ne!(a, b);

        alloc.free(a);
        assert_eq!(alloc.assignment(a), None);
        let c = alloc.alloc("Fingered Bass").unwrap();
        assert_eq!(c, a);
        assert_eq!(alloc.assignment(c), Some("Fingered Bass"));
        proxy.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn reset_rewinds_the_cursor() {
        let (mut alloc, _backend, proxy) = make_allocator(DEFAULT_CHANNEL_COUNT);
        alloc.alloc("Steel Guitar").unwrap();
        alloc.alloc("Steel Guitar").unwrap();
        alloc.reset();
        assert_eq!(alloc.alloc("Steel Guitar").unwrap(), 1);
        proxy.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn releasing_a_track_frees_its_channels() {
        let (mut alloc, _backend, proxy) = make_allocator(DEFAULT_CHANNEL_COUNT);
        let a = alloc.alloc("Steel Guitar").unwrap();
        let b = alloc.alloc("Fingered Bass").unwrap();
        let track = TrackId::new(7);
        alloc.bind_track(track, vec![a, b]);

        alloc.release_track(track);
        assert!(alloc.track_channels(track).is_none());
        assert_eq!(alloc.assignment(a), None);
        assert_eq!(alloc.assignment(b), None);
        proxy.shutdown(Duration::from_secs(1));
    }
}
