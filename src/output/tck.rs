//! MRtrix-style `.tck` track files.
//!
//! Text header terminated by `END`, then little-endian f32 triples. Tracks are separated by a
//! NaN triple and the file ends with an Inf triple. The `count` field is written as a fixed-width
//! placeholder and patched in [`TrackWriter::finish`].

use anyhow::{Context, Result};
use std::io::{Seek, SeekFrom, Write};

use super::TrackWriter;
use crate::types::Streamline;

const MAGIC: &str = "mrtrix tracks";
const COUNT_WIDTH: usize = 10;

pub struct TckWriter<W: Write + Seek> {
    inner: W,
    count_pos: u64,
    written: u64,
    finished: bool,
}

impl<W: Write + Seek> TckWriter<W> {
    /// Write the header. `properties` are extra `key: value` lines (e.g. step size).
    pub fn new(mut inner: W, properties: &[(String, String)]) -> Result<Self> {
        let mut head = format!("{MAGIC}\n");
        for (k, v) in properties {
            head.push_str(&format!("{}: {}\n", k, v));
        }
        head.push_str("datatype: Float32LE\n");
        let count_pos = (head.len() + "count: ".len()) as u64;
        head.push_str(&format!("count: {:0width$}\n", 0, width = COUNT_WIDTH));

        let offset = data_offset(head.len());
        head.push_str(&format!("file: . {}\nEND\n", offset));
        debug_assert_eq!(head.len(), offset);

        inner.write_all(head.as_bytes()).context("write tck header")?;
        Ok(Self {
            inner,
            count_pos,
            written: 0,
            finished: false,
        })
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn write_triple(&mut self, x: f32, y: f32, z: f32) -> Result<()> {
        let mut buf = [0u8; 12];
        buf[0..4].copy_from_slice(&x.to_le_bytes());
        buf[4..8].copy_from_slice(&y.to_le_bytes());
        buf[8..12].copy_from_slice(&z.to_le_bytes());
        self.inner.write_all(&buf).context("write tck data")
    }
}

/// Offset of the first data byte given `prefix` header bytes before the `file:` line.
/// The line holds its own offset, so iterate until the digit count is stable.
fn data_offset(prefix: usize) -> usize {
    let fixed = prefix + "file: . \nEND\n".len();
    let mut offset = fixed + 1;
    loop {
        let next = fixed + offset.to_string().len();
        if next == offset {
            return offset;
        }
        offset = next;
    }
}

impl<W: Write + Seek> TrackWriter for TckWriter<W> {
    fn accept(&mut self, track: Streamline) -> Result<()> {
        for p in &track.points {
            self.write_triple(p.x, p.y, p.z)?;
        }
        self.write_triple(f32::NAN, f32::NAN, f32::NAN)?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.write_triple(f32::INFINITY, f32::INFINITY, f32::INFINITY)?;
        let end = self.inner.stream_position().context("tck stream position")?;
        self.inner
            .seek(SeekFrom::Start(self.count_pos))
            .context("seek to tck count")?;
        write!(self.inner, "{:0width$}", self.written, width = COUNT_WIDTH)
            .context("patch tck count")?;
        self.inner.seek(SeekFrom::Start(end)).context("seek to tck end")?;
        self.inner.flush().context("flush tck output")?;
        self.finished = true;
        Ok(())
    }

    fn written(&self) -> u64 {
        self.written
    }
}
