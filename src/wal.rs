//! On-disk assignment log.
//!
//! Each frame is a little-endian `u32` payload length, the bincode-encoded
//! [`Record`], then a `u32` CRC-32 of the payload. The log is only ever
//! appended to, except when compaction swaps in a rewritten copy.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Record;

/// Upper bound on one payload. A length prefix above this is garbage, not a
/// record worth allocating for.
const MAX_FRAME_LEN: usize = 1 << 20;

fn write_frame(out: &mut impl Write, record: &Record) -> io::Result<()> {
    let payload =
        bincode::serialize(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "record too large"));
    }
    out.write_all(&(payload.len() as u32).to_le_bytes())?;
    out.write_all(&payload)?;
    out.write_all(&crc32fast::hash(&payload).to_le_bytes())
}

/// How reading one frame ended.
enum Frame {
    Record(Record),
    /// Clean end of log.
    End,
    /// Short, oversized, checksum-failing or undecodable frame.
    Damaged(&'static str),
}

/// Fill `buf`; `false` when the file ends first.
fn fill(input: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match input.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn read_frame(input: &mut impl Read) -> io::Result<Frame> {
    let mut word = [0u8; 4];
    if !fill(input, &mut word)? {
        return Ok(Frame::End);
    }
    let len = u32::from_le_bytes(word) as usize;
    if len > MAX_FRAME_LEN {
        return Ok(Frame::Damaged("length prefix out of range"));
    }

    let mut payload = vec![0u8; len];
    if !fill(input, &mut payload)? || !fill(input, &mut word)? {
        return Ok(Frame::Damaged("torn tail"));
    }
    if u32::from_le_bytes(word) != crc32fast::hash(&payload) {
        return Ok(Frame::Damaged("checksum mismatch"));
    }
    Ok(match bincode::deserialize(&payload) {
        Ok(record) => Frame::Record(record),
        Err(_) => Frame::Damaged("undecodable record"),
    })
}

fn open_for_append(path: &Path) -> io::Result<BufWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(file))
}

/// Sibling file a compacted log is staged in before the rename.
fn staging_path(path: &Path) -> PathBuf {
    path.with_extension("wal.tmp")
}

/// Append handle on the assignment log.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            writer: open_for_append(path)?,
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    #[cfg(test)]
    pub fn append(&mut self, record: &Record) -> io::Result<()> {
        self.append_buffered(record)?;
        self.flush_sync()
    }

    /// Nothing is durable until the next [`Wal::flush_sync`].
    pub fn append_buffered(&mut self, record: &Record) -> io::Result<()> {
        write_frame(&mut self.writer, record)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Stage `records` as a complete replacement log next to `path`.
    pub fn write_compact_file(path: &Path, records: &[Record]) -> io::Result<()> {
        let mut staged = BufWriter::new(File::create(staging_path(path))?);
        for record in records {
            write_frame(&mut staged, record)?;
        }
        staged.flush()?;
        staged.get_ref().sync_all()
    }

    /// Move the staged log over the live one and continue appending there.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(staging_path(&self.path), &self.path)?;
        self.writer = open_for_append(&self.path)?;
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, records: &[Record]) -> io::Result<()> {
        Self::write_compact_file(&self.path, records)?;
        self.swap_compact_file()
    }

    /// Every record up to the first damaged frame. A missing file is an
    /// empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Record>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut input = BufReader::new(file);
        let mut records = Vec::new();
        loop {
            match read_frame(&mut input)? {
                Frame::Record(record) => records.push(record),
                Frame::End => break,
                Frame::Damaged(reason) => {
                    tracing::warn!(
                        path = %path.display(),
                        replayed = records.len(),
                        reason,
                        "discarding damaged WAL tail"
                    );
                    break;
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Assignment, AssignmentId, AssignmentStatus, Span};

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("gatesched_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn saved(id: u64, gate: &str, start: i64, end: i64) -> Record {
        Record::Saved(Assignment {
            id: Some(AssignmentId(id)),
            gate: gate.into(),
            flight: format!("FL{id}"),
            span: Span::new(start, end),
            status: AssignmentStatus::Scheduled,
            cancelled: false,
            assigned_by: "system".into(),
            created_by: "system".into(),
            created_at: Some(0),
            updated_at: Some(0),
        })
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let records = vec![
            saved(1, "T1G1", 1000, 2000),
            Record::Deleted { id: AssignmentId(1) },
        ];

        {
            let mut wal = Wal::open(&path).unwrap();
            for r in &records {
                wal.append(r).unwrap();
            }
        }

        assert_eq!(Wal::replay(&path).unwrap(), records);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_drops_torn_tail() {
        let path = tmp_path("torn_tail.wal");
        let record = saved(1, "T1G1", 1000, 2000);

        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&record).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[9u8, 0, 0, 0, 1, 2]).unwrap(); // length says 9, only 2 bytes follow
        }

        assert_eq!(Wal::replay(&path).unwrap(), vec![record]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_missing_file_is_empty() {
        let path = tmp_path("missing.wal");
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn replay_stops_at_bad_crc() {
        let path = tmp_path("bad_crc.wal");
        let good = saved(1, "T1G1", 1000, 2000);

        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&good).unwrap();
        }
        {
            let payload = bincode::serialize(&Record::Deleted { id: AssignmentId(1) }).unwrap();
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), vec![good]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compaction_shrinks_and_accepts_appends() {
        let path = tmp_path("compact.wal");

        let mut wal = Wal::open(&path).unwrap();
        for id in 1..=20 {
            wal.append(&saved(id, "T1G1", 1000, 2000)).unwrap();
            wal.append(&Record::Deleted { id: AssignmentId(id) }).unwrap();
        }
        wal.append(&saved(21, "T1G2", 0, 10)).unwrap();
        let before = fs::metadata(&path).unwrap().len();

        let compacted = vec![Record::Watermark { next_id: 22 }, saved(21, "T1G2", 0, 10)];
        wal.compact(&compacted).unwrap();
        assert_eq!(wal.appends_since_compact(), 0);

        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted log should be smaller: {after} < {before}");

        let extra = saved(22, "T1G3", 5, 15);
        wal.append(&extra).unwrap();
        drop(wal);

        let mut expected = compacted;
        expected.push(extra);
        assert_eq!(Wal::replay(&path).unwrap(), expected);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn buffered_appends_count_until_flushed() {
        let path = tmp_path("buffered.wal");
        let records: Vec<Record> = (1..=5).map(|i| saved(i, "T1G1", i as i64 * 10, i as i64 * 10 + 5)).collect();

        {
            let mut wal = Wal::open(&path).unwrap();
            for r in &records {
                wal.append_buffered(r).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 5);
            wal.flush_sync().unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), records);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn absurd_length_prefix_ends_replay() {
        let path = tmp_path("absurd_length.wal");
        let good = saved(1, "T1G1", 1000, 2000);
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&good).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&u32::MAX.to_le_bytes()).unwrap();
            f.write_all(&[0u8; 16]).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![good]);
    }
}
