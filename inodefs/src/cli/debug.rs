use crate::config::Settings;
use crate::db::Db;
use crate::fs::key_codec::{KeyCodec, KeyPrefix, ParsedKey};
use anyhow::{Context, Result};
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

pub async fn list_keys(config_path: PathBuf) -> Result<()> {
    let settings = Settings::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let slatedb = super::server::build_slatedb(&settings).await?;
    let db = Db::new(slatedb);

    println!("Scanning all keys in the database...\n");

    let summary = print_keys(&db).await?;

    println!("\n=== Summary ===");
    println!("Total keys: {}", summary.total);
    println!("\nKeys by type:");
    for (prefix, count) in summary.sorted_prefix_counts() {
        println!("  {}: {}", prefix.as_str(), count);
    }
    println!("\nKeys by tenant:");
    for (tenant, count) in &summary.by_tenant {
        println!("  {}: {}", tenant, count);
    }

    db.close().await?;
    Ok(())
}

#[derive(Default)]
struct KeySummary {
    total: usize,
    by_prefix: HashMap<KeyPrefix, usize>,
    by_tenant: BTreeMap<String, usize>,
}

impl KeySummary {
    fn sorted_prefix_counts(&self) -> Vec<(KeyPrefix, usize)> {
        let mut counts: Vec<_> = self.by_prefix.iter().map(|(p, c)| (*p, *c)).collect();
        counts.sort_by_key(|(prefix, _)| u8::from(*prefix));
        counts
    }
}

async fn print_keys(db: &Db) -> Result<KeySummary> {
    let iter = db.scan(..).await?;
    futures::pin_mut!(iter);

    let mut summary = KeySummary::default();

    while let Some(result) = iter.next().await {
        let (key, _value) = match result {
            Ok(kv) => kv,
            Err(e) => {
                eprintln!("Error scanning database: {}", e);
                continue;
            }
        };

        let Some(prefix) = key.first().and_then(|&b| KeyPrefix::try_from(b).ok()) else {
            if key.is_empty() {
                println!("Empty key found");
            } else {
                println!("Unknown prefix: 0x{:02x} - Key: {:?}", key[0], key);
            }
            continue;
        };

        summary.total += 1;
        *summary.by_prefix.entry(prefix).or_insert(0) += 1;

        let (line, tenant) = describe(&KeyCodec::parse_key(&key), &key);
        println!("[{}] {}", prefix.as_str(), line);
        if let Some(tenant) = tenant {
            *summary.by_tenant.entry(tenant).or_insert(0) += 1;
        }
    }

    Ok(summary)
}

fn describe(parsed: &ParsedKey, raw: &[u8]) -> (String, Option<String>) {
    match parsed {
        ParsedKey::Inode { tenant, inode_id } => (
            format!("tenant={}, inode_id={}", tenant, inode_id),
            Some(tenant.to_string()),
        ),
        ParsedKey::Chunk {
            tenant,
            inode_id,
            chunk_index,
        } => (
            format!(
                "tenant={}, inode_id={}, chunk_index={}",
                tenant, inode_id, chunk_index
            ),
            Some(tenant.to_string()),
        ),
        ParsedKey::DirEntry {
            tenant,
            dir_id,
            name,
        } => (
            format!(
                "tenant={}, dir_id={}, name=\"{}\"",
                tenant,
                dir_id,
                String::from_utf8_lossy(name)
            ),
            Some(tenant.to_string()),
        ),
        ParsedKey::DirScan {
            tenant,
            dir_id,
            cookie,
        } => (
            format!("tenant={}, dir_id={}, cookie={}", tenant, dir_id, cookie),
            Some(tenant.to_string()),
        ),
        ParsedKey::Tombstone { tenant, inode_id } => (
            format!("tenant={}, inode_id={}", tenant, inode_id),
            Some(tenant.to_string()),
        ),
        ParsedKey::Counter { tenant } => (
            format!("tenant={}, next_inode_id", tenant),
            Some(tenant.to_string()),
        ),
        ParsedKey::DirCookie { tenant, dir_id } => (
            format!("tenant={}, dir_id={}, next_cookie", tenant, dir_id),
            Some(tenant.to_string()),
        ),
        ParsedKey::Unknown => (format!("raw={:?}", raw), None),
    }
}
