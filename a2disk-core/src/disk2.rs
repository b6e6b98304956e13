//! Reference Disk II card: two floppies with per-drive track storage.
//!
//! Turning images into tracks is the job of a `TrackCodec`. The bundled
//! `RawTrackCodec` only slices sector and nibble images into 35 tracks in
//! image order; a codec producing real bit streams (6-and-2 encoding, WOZ
//! flux decoding) plugs in the same way.

use crate::catalog::{DSK_IMAGE_SIZE, NIB_IMAGE_SIZE};
use crate::controller::{FloppyController, ImageFile, TrackFormat, TrackStorage};
use crate::error::{DiskError, DiskResult};

/// Tracks on a 5.25" floppy.
pub const TRACK_COUNT: usize = 35;

/// Bytes of one track of a nibble image.
pub const NIB_TRACK_SIZE: usize = NIB_IMAGE_SIZE / TRACK_COUNT;

/// Bytes of one track of a sector image (16 x 256).
pub const DSK_TRACK_SIZE: usize = DSK_IMAGE_SIZE / TRACK_COUNT;

/// One track as held by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub data: Vec<u8>,
    pub bit_count: u32,
    /// Written since it was loaded or last stored back.
    pub dirty: bool,
}

impl Track {
    pub fn new(data: Vec<u8>) -> Self {
        let bit_count = (data.len() * 8) as u32;
        Self {
            data,
            bit_count,
            dirty: false,
        }
    }
}

/// Image <-> track conversion.
pub trait TrackCodec {
    fn decode(&self, image: &ImageFile<'_>) -> DiskResult<Vec<Track>>;

    /// Write `tracks` back into `image`. Only dirty tracks need encoding.
    /// Returns true if any byte changed.
    fn encode(&self, format: TrackFormat, tracks: &[Track], image: &mut [u8]) -> DiskResult<bool>;
}

/// Slices fixed-size images into tracks without re-encoding them.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawTrackCodec;

impl RawTrackCodec {
    fn track_size(format: TrackFormat) -> DiskResult<usize> {
        match format {
            TrackFormat::Dsk | TrackFormat::Do | TrackFormat::Po => Ok(DSK_TRACK_SIZE),
            TrackFormat::Nib => Ok(NIB_TRACK_SIZE),
            TrackFormat::Woz => Err(DiskError::Loader(
                "flux-level images need a WOZ codec".to_string(),
            )),
        }
    }
}

impl TrackCodec for RawTrackCodec {
    fn decode(&self, image: &ImageFile<'_>) -> DiskResult<Vec<Track>> {
        let track_size = Self::track_size(image.format)?;
        if image.size() != track_size * TRACK_COUNT {
            return Err(DiskError::Loader(format!(
                "{}: {} bytes is not a {:?} image",
                image.pathname,
                image.size(),
                image.format
            )));
        }
        Ok(image
            .data
            .chunks_exact(track_size)
            .map(|chunk| Track::new(chunk.to_vec()))
            .collect())
    }

    fn encode(&self, format: TrackFormat, tracks: &[Track], image: &mut [u8]) -> DiskResult<bool> {
        let track_size = Self::track_size(format)?;
        let mut changed = false;
        for (index, track) in tracks.iter().enumerate().filter(|(_, t)| t.dirty) {
            let start = index * track_size;
            let dst = image
                .get_mut(start..start + track_size)
                .ok_or_else(|| DiskError::Loader(format!("track {} past end of image", index)))?;
            let src = &track.data[..track_size.min(track.data.len())];
            if dst[..src.len()] != *src {
                dst[..src.len()].copy_from_slice(src);
                changed = true;
            }
        }
        Ok(changed)
    }
}

/// One drive of the card.
#[derive(Debug, Clone, Default)]
pub struct Floppy<C> {
    tracks: Vec<Track>,
    codec: C,
}

impl<C: TrackCodec> Floppy<C> {
    pub fn new(codec: C) -> Self {
        Self {
            tracks: Vec::new(),
            codec,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Emulated write: overwrite bytes of a track and mark it dirty.
    pub fn write_track(&mut self, index: usize, offset: usize, bytes: &[u8]) -> DiskResult<()> {
        let track = self
            .tracks
            .get_mut(index)
            .ok_or_else(|| DiskError::Loader(format!("no track {}", index)))?;
        let dst = track
            .data
            .get_mut(offset..offset + bytes.len())
            .ok_or_else(|| DiskError::Loader(format!("write past end of track {}", index)))?;
        dst.copy_from_slice(bytes);
        track.dirty = true;
        Ok(())
    }
}

impl<C: TrackCodec> TrackStorage for Floppy<C> {
    fn reinit(&mut self) {
        self.tracks.clear();
    }

    fn load(&mut self, image: &ImageFile<'_>) -> DiskResult<()> {
        self.tracks = self.codec.decode(image)?;
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    fn store(&mut self, format: TrackFormat, image: &mut [u8]) -> DiskResult<bool> {
        let changed = self.codec.encode(format, &self.tracks, image)?;
        for track in &mut self.tracks {
            track.dirty = false;
        }
        Ok(changed)
    }
}

/// Disk II card installed in one slot.
pub struct Disk2Card<C = RawTrackCodec> {
    slot: u8,
    floppies: [Floppy<C>; 2],
    bootable: bool,
}

impl Disk2Card<RawTrackCodec> {
    pub fn new(slot: u8) -> Self {
        Self::with_codec(slot, RawTrackCodec)
    }
}

impl<C: TrackCodec + Clone> Disk2Card<C> {
    pub fn with_codec(slot: u8, codec: C) -> Self {
        Self {
            slot,
            floppies: [Floppy::new(codec.clone()), Floppy::new(codec)],
            bootable: false,
        }
    }
}

impl<C: TrackCodec> Disk2Card<C> {
    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn is_bootable(&self) -> bool {
        self.bootable
    }

    pub fn drive(&self, drive: usize) -> Option<&Floppy<C>> {
        self.floppies.get(drive)
    }

    pub fn drive_mut(&mut self, drive: usize) -> Option<&mut Floppy<C>> {
        self.floppies.get_mut(drive)
    }
}

impl<C: TrackCodec> FloppyController for Disk2Card<C> {
    fn floppy(&mut self, slot: u8, drive: usize) -> Option<&mut dyn TrackStorage> {
        if slot != self.slot {
            return None;
        }
        self.floppies
            .get_mut(drive)
            .map(|f| f as &mut dyn TrackStorage)
    }

    fn set_bootable(&mut self, slot: u8, enable: bool) {
        if slot == self.slot {
            self.bootable = enable;
        }
    }
}
