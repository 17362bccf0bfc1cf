//! Sinks for accepted paths and the single-consumer loop that feeds them.

pub mod stream;
pub mod tck;

pub use stream::{WriteStreamingParams, write_streaming};
pub use tck::TckWriter;

use anyhow::{Context, Result};
use std::io::Write;

use crate::types::Streamline;

/// Receives every accepted path exactly once, from a single thread.
pub trait TrackWriter {
    fn accept(&mut self, track: Streamline) -> Result<()>;

    /// Flush and finalise. Called once after the last path.
    fn finish(&mut self) -> Result<()>;

    fn written(&self) -> u64;
}

/// Keeps paths in memory.
#[derive(Debug, Default)]
pub struct VecWriter {
    pub tracks: Vec<Streamline>,
}

impl VecWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_tracks(self) -> Vec<Streamline> {
        self.tracks
    }
}

impl TrackWriter for VecWriter {
    fn accept(&mut self, track: Streamline) -> Result<()> {
        self.tracks.push(track);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn written(&self) -> u64 {
        self.tracks.len() as u64
    }
}

/// One JSON object per line: `{"points":[[x,y,z],...],"seed_index":n}`.
pub struct JsonLinesWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> JsonLinesWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> TrackWriter for JsonLinesWriter<W> {
    fn accept(&mut self, track: Streamline) -> Result<()> {
        serde_json::to_writer(&mut self.inner, &track).context("serialize track")?;
        self.inner.write_all(b"\n").context("write track")?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.inner.flush().context("flush track output")
    }

    fn written(&self) -> u64 {
        self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn json_lines_one_object_per_track() {
        let mut w = JsonLinesWriter::new(Vec::new());
        w.accept(Streamline::new(vec![Vec3::ZERO, Vec3::X], 0)).unwrap();
        w.accept(Streamline::new(vec![Vec3::Y, Vec3::ONE], 1)).unwrap();
        w.finish().unwrap();
        assert_eq!(w.written(), 2);
        let text = String::from_utf8(w.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let v: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(v["seed_index"], 1);
        assert_eq!(v["points"][1][0], 1.0);
    }
}
