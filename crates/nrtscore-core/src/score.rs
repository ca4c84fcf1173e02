//! SuperCollider score files for NRT (non-realtime) rendering.
//!
//! The score file format is:
//! - For each offset: 4-byte big-endian length prefix + encoded OSC bundle
//! - No trailing marker; scsynth stops at EOF
//!
//! [`Score::write_archive`] bundles the same stream with the uploaded
//! definitions split out into `synthdefs/<name>.scsyndef`.

use crate::error::Result;
use crate::render::Timeline;
use crate::requests::Request;
use crate::timing::{offset_to_osc_time, AbsoluteOffset};
use rosc::{encoder, OscBundle, OscPacket};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tar::{Builder, Header};

/// Rendered requests, one bundle per offset.
#[derive(Debug, Clone, Default)]
pub struct Score {
    entries: Timeline,
}

impl Score {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a rendered timeline. Entries are kept in offset order.
    pub fn from_timeline(mut entries: Timeline) -> Self {
        entries.sort_by_key(|(offset, _)| *offset);
        Self { entries }
    }

    /// Append requests at `offset`, merging with an existing entry there.
    pub fn add(&mut self, offset: AbsoluteOffset, requests: Vec<Request>) {
        match self.entries.binary_search_by_key(&offset, |(o, _)| *o) {
            Ok(index) => self.entries[index].1.extend(requests),
            Err(index) => self.entries.insert(index, (offset, requests)),
        }
    }

    pub fn entries(&self) -> &Timeline {
        &self.entries
    }

    /// Offset of the last entry in seconds.
    pub fn duration(&self) -> f64 {
        self.entries
            .last()
            .map(|(offset, _)| offset.as_f64())
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One OSC bundle per entry.
    pub fn to_bundles(&self) -> Vec<OscBundle> {
        self.entries
            .iter()
            .map(|(offset, requests)| bundle(*offset, requests.iter()))
            .collect()
    }

    /// Length-prefixed bundles, ready for `scsynth -N`.
    pub fn to_datagram(&self) -> Result<Vec<u8>> {
        encode_stream(self.to_bundles())
    }

    /// Write the datagram stream to `path`.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let data = self.to_datagram()?;
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&data)?;
        writer.flush()?;
        log::info!(
            "[SCORE] Wrote {} bundles ({} bytes) to {:?}",
            self.entries.len(),
            data.len(),
            path
        );
        Ok(())
    }

    /// Write a tar archive holding:
    /// - `score.osc`: the datagram stream without `/d_recv` requests
    /// - `synthdefs/<name>.scsyndef`: every uploaded definition
    pub fn write_archive(&self, path: &Path) -> Result<()> {
        let mut synthdefs: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        let mut bundles = Vec::with_capacity(self.entries.len());
        for (offset, requests) in &self.entries {
            for request in requests {
                if let Request::SynthDefReceive { synthdef } = request {
                    synthdefs.insert(synthdef.name().to_string(), synthdef.bytes().to_vec());
                }
            }
            let remaining: Vec<&Request> = requests
                .iter()
                .filter(|r| !matches!(r, Request::SynthDefReceive { .. }))
                .collect();
            if !remaining.is_empty() {
                bundles.push(bundle(*offset, remaining.into_iter()));
            }
        }
        let score_data = encode_stream(bundles)?;

        let mut archive = Builder::new(File::create(path)?);
        append(&mut archive, "score.osc", &score_data)?;
        for (name, bytes) in &synthdefs {
            append(&mut archive, &format!("synthdefs/{}.scsyndef", name), bytes)?;
            log::debug!("[SCORE] Added synthdef: {}", name);
        }
        archive.finish()?;

        log::info!(
            "[SCORE] Wrote score archive with {} synthdefs and {} bundles",
            synthdefs.len(),
            self.entries.len()
        );
        Ok(())
    }
}

fn bundle<'a>(offset: AbsoluteOffset, requests: impl Iterator<Item = &'a Request>) -> OscBundle {
    OscBundle {
        timetag: offset_to_osc_time(offset),
        content: requests.map(Request::to_osc).collect(),
    }
}

fn encode_stream(bundles: Vec<OscBundle>) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    for bundle in bundles {
        let encoded = encoder::encode(&OscPacket::Bundle(bundle))?;
        data.extend_from_slice(&(encoded.len() as i32).to_be_bytes());
        data.extend_from_slice(&encoded);
    }
    Ok(data)
}

fn append<W: Write>(archive: &mut Builder<W>, path: &str, data: &[u8]) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_path(path)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    archive.append(&header, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::AddAction;
    use nrtscore_dsp::dc_synthdef;
    use std::io::Read;
    use std::sync::Arc;

    fn sample() -> Score {
        let synthdef = Arc::new(dc_synthdef().unwrap());
        let mut score = Score::new();
        score.add(AbsoluteOffset::new(1.0), vec![Request::Nothing]);
        score.add(
            AbsoluteOffset::ZERO,
            vec![
                Request::SynthDefReceive {
                    synthdef: Arc::clone(&synthdef),
                },
                Request::SynthNew {
                    synthdef: synthdef.name().to_string(),
                    node_id: 1000,
                    add_action: AddAction::AddToHead,
                    target: 0,
                    controls: Vec::new(),
                },
            ],
        );
        score
    }

    #[test]
    fn test_entries_stay_sorted() {
        let mut score = sample();
        assert_eq!(score.len(), 2);
        assert_eq!(score.duration(), 1.0);
        score.add(AbsoluteOffset::ZERO, vec![Request::Nothing]);
        assert_eq!(score.len(), 2);
        assert_eq!(score.entries()[0].1.len(), 3);
    }

    #[test]
    fn test_datagram_is_length_prefixed() {
        let data = sample().to_datagram().unwrap();
        let mut cursor = 0;
        let mut count = 0;
        while cursor < data.len() {
            let len = i32::from_be_bytes([
                data[cursor],
                data[cursor + 1],
                data[cursor + 2],
                data[cursor + 3],
            ]) as usize;
            cursor += 4;
            assert_eq!(&data[cursor..cursor + 8], b"#bundle\0");
            cursor += len;
            count += 1;
        }
        assert_eq!(cursor, data.len());
        assert_eq!(count, 2);
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("score.osc");
        let score = sample();
        score.write_to_file(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), score.to_datagram().unwrap());
    }

    #[test]
    fn test_archive_splits_synthdefs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("score.tar");
        sample().write_archive(&path).unwrap();

        let mut archive = tar::Archive::new(File::open(&path).unwrap());
        let mut names = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().display().to_string();
            if name == "score.osc" {
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                assert!(!data.windows(7).any(|w| w == b"/d_recv"));
            }
            names.push(name);
        }
        let synthdef = dc_synthdef().unwrap();
        assert_eq!(
            names,
            vec![
                "score.osc".to_string(),
                format!("synthdefs/{}.scsyndef", synthdef.name())
            ]
        );
    }
}
