// pvs.rs — decompressed cluster visibility rows
//
// Rows are stored uncompressed, one bit per cluster, so a lookup is a
// single shift and mask. Row i bit j set means cluster j may be seen from
// cluster i. Rows are kept exactly as the level data encodes them: no
// symmetry is imposed, only the self bit is forced on.

use pbsp_common::bspfile::VisHeader;
use pbsp_common::error::VisError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PvsTable {
    num_clusters: usize,
    row_bytes: usize,
    rows: Vec<u8>,
}

#[inline]
fn row_bytes_for(num_clusters: usize) -> usize {
    (num_clusters + 7) >> 3
}

impl PvsTable {
    /// Every cluster sees every other. Used when the level has no
    /// visibility data or visibility is switched off.
    pub fn all_visible(num_clusters: usize) -> Self {
        let row_bytes = row_bytes_for(num_clusters);
        let mut table = PvsTable {
            num_clusters,
            row_bytes,
            rows: vec![0xff; row_bytes * num_clusters],
        };
        for cluster in 0..num_clusters {
            table.finish_row(cluster);
        }
        table
    }

    /// Decompress `num_clusters` rows stored back to back in `stream`.
    pub fn build(stream: &[u8], num_clusters: usize) -> Result<Self, VisError> {
        let row_bytes = row_bytes_for(num_clusters);
        let mut table = PvsTable {
            num_clusters,
            row_bytes,
            rows: vec![0; row_bytes * num_clusters],
        };

        let mut pos = 0;
        for cluster in 0..num_clusters {
            pos = decompress_row(stream, pos, cluster, table.row_mut(cluster))?;
            table.finish_row(cluster);
        }
        log::debug!(
            "pvs: {} clusters, {} of {} compressed bytes used",
            num_clusters,
            pos,
            stream.len()
        );
        Ok(table)
    }

    /// Decompress one column (`DVIS_PVS` or `DVIS_PHS`) of a visibility
    /// lump through its per-cluster offset table. A negative offset marks
    /// a cluster without data, which sees everything.
    pub fn from_vis_lump(lump: &[u8], column: usize) -> Result<Self, VisError> {
        let header = VisHeader::parse(lump)?;
        let num_clusters = header.num_clusters;
        let row_bytes = row_bytes_for(num_clusters);
        let mut table = PvsTable {
            num_clusters,
            row_bytes,
            rows: vec![0; row_bytes * num_clusters],
        };

        for (cluster, offsets) in header.offsets.iter().enumerate() {
            let offset = offsets[column];
            if offset < 0 {
                table.row_mut(cluster).fill(0xff);
            } else if offset as usize >= lump.len() {
                return Err(VisError::RowOutOfRange {
                    cluster,
                    offset,
                    len: lump.len(),
                });
            } else {
                decompress_row(lump, offset as usize, cluster, table.row_mut(cluster))?;
            }
            table.finish_row(cluster);
        }
        Ok(table)
    }

    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    pub fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    pub fn row(&self, cluster: usize) -> Option<&[u8]> {
        if cluster >= self.num_clusters {
            return None;
        }
        let start = cluster * self.row_bytes;
        Some(&self.rows[start..start + self.row_bytes])
    }

    /// Negative or unknown clusters are treated as visible.
    #[inline]
    pub fn is_visible(&self, from: i32, to: i32) -> bool {
        if from < 0 || to < 0 {
            return true;
        }
        let (from, to) = (from as usize, to as usize);
        if from >= self.num_clusters || to >= self.num_clusters {
            return true;
        }
        self.rows[from * self.row_bytes + (to >> 3)] & (1 << (to & 7)) != 0
    }

    fn row_mut(&mut self, cluster: usize) -> &mut [u8] {
        let start = cluster * self.row_bytes;
        &mut self.rows[start..start + self.row_bytes]
    }

    /// Clear bits past the last cluster and set the self bit.
    fn finish_row(&mut self, cluster: usize) {
        let tail = self.num_clusters & 7;
        let row_bytes = self.row_bytes;
        let row = self.row_mut(cluster);
        if tail != 0 {
            row[row_bytes - 1] &= (1u8 << tail) - 1;
        }
        row[cluster >> 3] |= 1 << (cluster & 7);
    }
}

/// Expand one row starting at `pos`. A non-zero byte is copied; a zero
/// byte is followed by a count of zero bytes. Returns the position after
/// the row.
fn decompress_row(data: &[u8], mut pos: usize, cluster: usize, out: &mut [u8]) -> Result<usize, VisError> {
    let row_bytes = out.len();
    let mut out_p = 0;
    while out_p < row_bytes {
        let Some(&b) = data.get(pos) else {
            return Err(VisError::RowTruncated { cluster });
        };
        if b != 0 {
            out[out_p] = b;
            out_p += 1;
            pos += 1;
            continue;
        }

        let Some(&count) = data.get(pos + 1) else {
            return Err(VisError::RowTruncated { cluster });
        };
        pos += 2;
        let mut count = count as usize;
        if out_p + count > row_bytes {
            log::warn!(
                "vis row for cluster {} overruns by {} bytes, clamped",
                cluster,
                out_p + count - row_bytes
            );
            count = row_bytes - out_p;
        }
        out[out_p..out_p + count].fill(0);
        out_p += count;
    }
    Ok(pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbsp_common::bspfile::{DVIS_PHS, DVIS_PVS};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Zero bytes become `0, count` pairs; everything else is literal.
    fn rle_encode(row: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < row.len() {
            if row[i] != 0 {
                out.push(row[i]);
                i += 1;
                continue;
            }
            let mut run = 0;
            while i < row.len() && row[i] == 0 && run < 255 {
                run += 1;
                i += 1;
            }
            out.push(0);
            out.push(run as u8);
        }
        out
    }

    /// Random rows already masked to `n` clusters with the self bit set.
    fn random_rows(rng: &mut StdRng, n: usize) -> Vec<Vec<u8>> {
        let row_bytes = row_bytes_for(n);
        (0..n)
            .map(|c| {
                let mut row: Vec<u8> = (0..row_bytes)
                    .map(|_| if rng.gen_bool(0.4) { 0 } else { rng.gen() })
                    .collect();
                if n & 7 != 0 {
                    row[row_bytes - 1] &= (1u8 << (n & 7)) - 1;
                }
                row[c >> 3] |= 1 << (c & 7);
                row
            })
            .collect()
    }

    fn round_trip(n: usize, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let rows = random_rows(&mut rng, n);
        let stream: Vec<u8> = rows.iter().flat_map(|r| rle_encode(r)).collect();
        let table = PvsTable::build(&stream, n).unwrap();
        for (c, row) in rows.iter().enumerate() {
            assert_eq!(table.row(c).unwrap(), row.as_slice(), "row {c} of {n}");
        }
    }

    #[test]
    fn test_round_trip_on_byte_boundary() {
        round_trip(64, 1);
    }

    #[test]
    fn test_round_trip_off_byte_boundary() {
        round_trip(61, 2);
        round_trip(3, 3);
    }

    #[test]
    fn test_long_zero_runs() {
        // 300 bytes of zeros needs two run pairs
        let n = 2400;
        let mut row = vec![0u8; row_bytes_for(n)];
        row[0] = 1;
        let mut stream = Vec::new();
        for c in 0..n {
            let mut r = row.clone();
            r[c >> 3] |= 1 << (c & 7);
            stream.extend(rle_encode(&r));
        }
        let table = PvsTable::build(&stream, n).unwrap();
        assert!(table.is_visible(1234, 0));
        assert!(!table.is_visible(1234, 2000));
        assert!(table.is_visible(2000, 2000));
    }

    #[test]
    fn test_explicit_rows_and_asymmetry() {
        // cluster 0 sees 2, cluster 2 does not see 0
        let stream = [0x05, 0x00, 0x01, 0x04];
        let table = PvsTable::build(&stream, 3).unwrap();
        assert_eq!(table.row(0), Some(&[0x05u8][..]));
        assert_eq!(table.row(1), Some(&[0x02u8][..]), "zero row keeps its self bit");
        assert!(table.is_visible(0, 2));
        assert!(!table.is_visible(2, 0));
        assert!(!table.is_visible(1, 0));
    }

    #[test]
    fn test_self_visibility_always_holds() {
        // five all-zero rows
        let stream: Vec<u8> = [0x00u8, 0x01].iter().cycle().take(2 * 5).copied().collect();
        let table = PvsTable::build(&stream, 5).unwrap();
        for c in 0..5 {
            assert!(table.is_visible(c, c), "cluster {c} must see itself");
            for other in (0..5).filter(|&o| o != c) {
                assert!(!table.is_visible(c, other));
            }
        }
    }

    #[test]
    fn test_bits_past_cluster_count_are_cleared() {
        let table = PvsTable::build(&[0xff, 0xff], 2).unwrap();
        assert_eq!(table.row(0), Some(&[0x03u8][..]));
        assert_eq!(PvsTable::all_visible(11).row(10), Some(&[0xffu8, 0x07][..]));
    }

    #[test]
    fn test_unknown_clusters_fail_open() {
        let table = PvsTable::build(&[0x01, 0x02], 2).unwrap();
        assert!(!table.is_visible(0, 1));
        assert!(table.is_visible(-1, 1));
        assert!(table.is_visible(0, -1));
        assert!(table.is_visible(0, 7), "out of range cluster");
        assert!(table.is_visible(99, 0));
        assert_eq!(table.row(2), None);
    }

    #[test]
    fn test_truncated_stream_is_an_error() {
        assert_eq!(
            PvsTable::build(&[0x01], 2),
            Err(VisError::RowTruncated { cluster: 1 })
        );
        // run escape with its count byte missing
        assert_eq!(
            PvsTable::build(&[0x01, 0x00], 2),
            Err(VisError::RowTruncated { cluster: 1 })
        );
    }

    #[test]
    fn test_overlong_run_is_clamped() {
        let _ = env_logger::builder().is_test(true).try_init();
        let table = PvsTable::build(&[0x00, 0x05, 0x03], 2).unwrap();
        assert_eq!(table.row(0), Some(&[0x01u8][..]));
        assert_eq!(table.row(1), Some(&[0x03u8][..]), "next row starts after the run pair");
    }

    #[test]
    fn test_empty_table() {
        let table = PvsTable::build(&[], 0).unwrap();
        assert_eq!(table.num_clusters(), 0);
        assert!(table.is_visible(0, 0));
    }

    fn vis_lump(offsets: &[[i32; 2]], rows: &[u8]) -> Vec<u8> {
        let mut lump = Vec::new();
        lump.extend_from_slice(&(offsets.len() as i32).to_le_bytes());
        for o in offsets {
            lump.extend_from_slice(&o[0].to_le_bytes());
            lump.extend_from_slice(&o[1].to_le_bytes());
        }
        lump.extend_from_slice(rows);
        lump
    }

    #[test]
    fn test_from_vis_lump_reads_both_columns() {
        // header is 4 + 2 * 8 = 20 bytes
        let lump = vis_lump(&[[20, -1], [21, 22]], &[0x03, 0x02, 0x00, 0x01]);
        let pvs = PvsTable::from_vis_lump(&lump, DVIS_PVS).unwrap();
        let phs = PvsTable::from_vis_lump(&lump, DVIS_PHS).unwrap();

        assert_eq!(pvs.num_clusters(), 2);
        assert!(pvs.is_visible(0, 1));
        assert!(!pvs.is_visible(1, 0));

        assert_eq!(phs.row(0), Some(&[0x03u8][..]), "no data means all visible");
        assert_eq!(phs.row(1), Some(&[0x02u8][..]));
    }

    #[test]
    fn test_from_vis_lump_shared_rows() {
        // both clusters point at the same compressed row
        let lump = vis_lump(&[[20, 20], [20, 20]], &[0x01]);
        let pvs = PvsTable::from_vis_lump(&lump, DVIS_PVS).unwrap();
        assert_eq!(pvs.row(0), Some(&[0x01u8][..]));
        assert_eq!(pvs.row(1), Some(&[0x03u8][..]), "self bit forced on a shared row");
    }

    #[test]
    fn test_from_vis_lump_errors() {
        let lump = vis_lump(&[[99, -1]], &[0x01]);
        assert_eq!(
            PvsTable::from_vis_lump(&lump, DVIS_PVS),
            Err(VisError::RowOutOfRange {
                cluster: 0,
                offset: 99,
                len: 13
            })
        );
        assert_eq!(
            PvsTable::from_vis_lump(&[1, 0], DVIS_PVS),
            Err(VisError::Truncated(2))
        );
        let mut bad = vis_lump(&[], &[]);
        bad[0..4].copy_from_slice(&(-3i32).to_le_bytes());
        assert_eq!(
            PvsTable::from_vis_lump(&bad, DVIS_PVS),
            Err(VisError::BadClusterCount(-3))
        );
    }
}
