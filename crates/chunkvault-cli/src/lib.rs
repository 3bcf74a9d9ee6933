/// A byte range of a local file sent as one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub chunk_number: i32,
    pub offset: u64,
    pub len: u64,
}

/// Split `file_len` bytes into chunks of at most `chunk_size` bytes.
///
/// An empty file still gets one (empty) chunk.
pub fn plan_chunks(file_len: u64, chunk_size: u64) -> Vec<ChunkSpan> {
    let chunk_size = chunk_size.max(1);
    let count = file_len.div_ceil(chunk_size).max(1);

    (0..count)
        .map(|i| {
            let offset = i * chunk_size;
            ChunkSpan {
                chunk_number: i as i32 + 1,
                offset,
                len: chunk_size.min(file_len - offset.min(file_len)),
            }
        })
        .collect()
}

/// Render a byte count for table output
pub fn format_size(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_chunks_even_split() {
        let spans = plan_chunks(30, 10);
        assert_eq!(spans.len(), 3);
        assert_eq!(
            spans[2],
            ChunkSpan {
                chunk_number: 3,
                offset: 20,
                len: 10
            }
        );
    }

    #[test]
    fn plan_chunks_short_tail() {
        let spans = plan_chunks(25, 10);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[2].len, 5);
        assert_eq!(spans.iter().map(|s| s.len).sum::<u64>(), 25);
    }

    #[test]
    fn plan_chunks_empty_file() {
        assert_eq!(
            plan_chunks(0, 10),
            vec![ChunkSpan {
                chunk_number: 1,
                offset: 0,
                len: 0
            }]
        );
    }

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MiB");
    }
}

/// Initialize tracing for the CLI binary.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chunkvault=info")),
        )
        .init();
}
