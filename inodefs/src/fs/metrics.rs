use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use num_format::{Locale, ToFormattedString};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

const MB_IN_BYTES: f64 = 1_048_576.0;

struct PreviousSnapshot {
    total_operations: u64,
    bytes_read: u64,
    bytes_written: u64,
    read_operations: u64,
    write_operations: u64,
    timestamp: Instant,
}

pub struct FileSystemStats {
    // Namespace operations
    pub files_created: AtomicU64,
    pub files_deleted: AtomicU64,
    pub directories_created: AtomicU64,
    pub directories_deleted: AtomicU64,
    pub links_created: AtomicU64,
    pub links_deleted: AtomicU64,
    pub lookups: AtomicU64,
    pub listings: AtomicU64,

    // Read/Write operations
    pub read_operations: AtomicU64,
    pub write_operations: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,

    // Garbage collection
    pub tombstones_created: AtomicU64,
    pub tombstones_processed: AtomicU64,
    pub gc_chunks_deleted: AtomicU64,
    pub gc_runs: AtomicU64,

    pub tenants_bootstrapped: AtomicU64,
    pub failed_operations: AtomicU64,
    pub total_operations: AtomicU64,

    // Internal state for rate calculation
    last_snapshot: std::sync::Mutex<PreviousSnapshot>,
}

impl FileSystemStats {
    pub fn new() -> Self {
        Self {
            files_created: AtomicU64::new(0),
            files_deleted: AtomicU64::new(0),
            directories_created: AtomicU64::new(0),
            directories_deleted: AtomicU64::new(0),
            links_created: AtomicU64::new(0),
            links_deleted: AtomicU64::new(0),
            lookups: AtomicU64::new(0),
            listings: AtomicU64::new(0),
            read_operations: AtomicU64::new(0),
            write_operations: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            tombstones_created: AtomicU64::new(0),
            tombstones_processed: AtomicU64::new(0),
            gc_chunks_deleted: AtomicU64::new(0),
            gc_runs: AtomicU64::new(0),
            tenants_bootstrapped: AtomicU64::new(0),
            failed_operations: AtomicU64::new(0),
            total_operations: AtomicU64::new(0),
            last_snapshot: std::sync::Mutex::new(PreviousSnapshot {
                total_operations: 0,
                bytes_read: 0,
                bytes_written: 0,
                read_operations: 0,
                write_operations: 0,
                timestamp: Instant::now(),
            }),
        }
    }

    fn rate(current: u64, previous: u64, interval_secs: f64) -> f64 {
        if interval_secs > 0.0 {
            current.saturating_sub(previous) as f64 / interval_secs
        } else {
            0.0
        }
    }

    pub fn report(&self) -> String {
        let files_created = self.files_created.load(Ordering::Relaxed);
        let files_deleted = self.files_deleted.load(Ordering::Relaxed);
        let dirs_created = self.directories_created.load(Ordering::Relaxed);
        let dirs_deleted = self.directories_deleted.load(Ordering::Relaxed);
        let links_created = self.links_created.load(Ordering::Relaxed);
        let links_deleted = self.links_deleted.load(Ordering::Relaxed);
        let lookups = self.lookups.load(Ordering::Relaxed);
        let listings = self.listings.load(Ordering::Relaxed);

        let read_ops = self.read_operations.load(Ordering::Relaxed);
        let write_ops = self.write_operations.load(Ordering::Relaxed);
        let bytes_read = self.bytes_read.load(Ordering::Relaxed);
        let bytes_written = self.bytes_written.load(Ordering::Relaxed);

        let tombstones_created = self.tombstones_created.load(Ordering::Relaxed);
        let tombstones_processed = self.tombstones_processed.load(Ordering::Relaxed);
        let gc_chunks = self.gc_chunks_deleted.load(Ordering::Relaxed);
        let gc_runs = self.gc_runs.load(Ordering::Relaxed);

        let tenants = self.tenants_bootstrapped.load(Ordering::Relaxed);
        let failed_ops = self.failed_operations.load(Ordering::Relaxed);
        let total_ops = self.total_operations.load(Ordering::Relaxed);

        let mut snapshot = match self.last_snapshot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let interval_secs = snapshot.timestamp.elapsed().as_secs_f64();

        let ops_per_sec = Self::rate(total_ops, snapshot.total_operations, interval_secs);
        let read_ops_per_sec = Self::rate(read_ops, snapshot.read_operations, interval_secs);
        let write_ops_per_sec = Self::rate(write_ops, snapshot.write_operations, interval_secs);
        let mb_read_per_sec =
            Self::rate(bytes_read, snapshot.bytes_read, interval_secs) / MB_IN_BYTES;
        let mb_written_per_sec =
            Self::rate(bytes_written, snapshot.bytes_written, interval_secs) / MB_IN_BYTES;

        *snapshot = PreviousSnapshot {
            total_operations: total_ops,
            bytes_read,
            bytes_written,
            read_operations: read_ops,
            write_operations: write_ops,
            timestamp: Instant::now(),
        };

        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("InodeFS Statistics")
                .fg(Color::Cyan)
                .add_attribute(Attribute::Bold),
            Cell::new("Value")
                .fg(Color::Cyan)
                .add_attribute(Attribute::Bold),
        ]);

        table.add_row(vec![
            Cell::new("Namespace Operations (total)")
                .fg(Color::Yellow)
                .add_attribute(Attribute::Bold),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("  Files"),
            Cell::new(format!(
                "Created: {} | Deleted: {}",
                files_created.to_formatted_string(&Locale::en),
                files_deleted.to_formatted_string(&Locale::en)
            )),
        ]);
        table.add_row(vec![
            Cell::new("  Directories"),
            Cell::new(format!(
                "Created: {} | Deleted: {}",
                dirs_created.to_formatted_string(&Locale::en),
                dirs_deleted.to_formatted_string(&Locale::en)
            )),
        ]);
        table.add_row(vec![
            Cell::new("  Links"),
            Cell::new(format!(
                "Created: {} | Deleted: {}",
                links_created.to_formatted_string(&Locale::en),
                links_deleted.to_formatted_string(&Locale::en)
            )),
        ]);
        table.add_row(vec![
            Cell::new("  Lookups / Listings"),
            Cell::new(format!(
                "{} / {}",
                lookups.to_formatted_string(&Locale::en),
                listings.to_formatted_string(&Locale::en)
            )),
        ]);
        table.add_row(vec![
            Cell::new("  Tenants"),
            Cell::new(format!(
                "{} bootstrapped",
                tenants.to_formatted_string(&Locale::en)
            )),
        ]);

        table.add_row(vec![
            Cell::new("I/O Performance (per second)")
                .fg(Color::Yellow)
                .add_attribute(Attribute::Bold),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("  Read"),
            Cell::new(format!(
                "{read_ops_per_sec:.1} ops/s ({mb_read_per_sec:.2} MB/s)"
            ))
            .fg(Color::Green),
        ]);
        table.add_row(vec![
            Cell::new("  Write"),
            Cell::new(format!(
                "{write_ops_per_sec:.1} ops/s ({mb_written_per_sec:.2} MB/s)"
            ))
            .fg(Color::Blue),
        ]);
        table.add_row(vec![
            Cell::new("  All Operations"),
            Cell::new(format!(
                "{ops_per_sec:.1} ops/s ({} failed in total)",
                failed_ops.to_formatted_string(&Locale::en)
            ))
            .fg(Color::Magenta)
            .add_attribute(Attribute::Bold),
        ]);

        table.add_row(vec![
            Cell::new("Garbage Collection (total)")
                .fg(Color::Yellow)
                .add_attribute(Attribute::Bold),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("  Tombstones"),
            Cell::new(format!(
                "{} created, {} processed",
                tombstones_created.to_formatted_string(&Locale::en),
                tombstones_processed.to_formatted_string(&Locale::en)
            )),
        ]);
        table.add_row(vec![
            Cell::new("  Chunks deleted"),
            Cell::new(format!(
                "{} (in {} runs)",
                gc_chunks.to_formatted_string(&Locale::en),
                gc_runs.to_formatted_string(&Locale::en)
            )),
        ]);

        table.to_string()
    }

    pub fn output_report_debug(&self) {
        tracing::debug!("\n{}", self.report());
    }
}

impl Default for FileSystemStats {
    fn default() -> Self {
        Self::new()
    }
}
