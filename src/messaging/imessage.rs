//! The external message source half of the Multiplexer (§4.6, §6, §10.4):
//! polls the Messages SQLite database for new inbound rows from the owner's
//! handle, decoding body text from either the plain `text` column or the
//! `attributedBody` typed-stream BLOB when `text` is empty.

use crate::error::{MessagingError, Result};
use crate::{InboundMessage, MessageContent};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::str::FromStr as _;
use tokio::sync::Mutex;

const POLL_LIMIT: i64 = 50;
/// If the DB's current max ROWID falls this far below our watermark, treat
/// it as a replaced/reset database rather than "no new messages".
const RESET_THRESHOLD: i64 = 1_000;
const CLI_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

const SELECT_QUERY: &str = "SELECT m.ROWID, m.text, m.is_from_me, m.date, m.attributedBody \
    FROM message m LEFT JOIN handle h ON m.handle_id = h.ROWID \
    WHERE m.ROWID > ? AND h.id = ? AND m.is_from_me = 0 AND m.associated_message_type = 0 \
    ORDER BY m.ROWID ASC LIMIT 50";

pub struct ImessagePoller {
    db_path: PathBuf,
    owner_address: String,
    dedup_capacity: usize,
    pool: Mutex<Option<SqlitePool>>,
    watermark: Mutex<i64>,
    seen: Mutex<VecDeque<i64>>,
}

impl ImessagePoller {
    pub fn new(db_path: PathBuf, owner_address: String, dedup_capacity: usize) -> Self {
        Self {
            db_path,
            owner_address,
            dedup_capacity,
            pool: Mutex::new(None),
            watermark: Mutex::new(0),
            seen: Mutex::new(VecDeque::with_capacity(dedup_capacity)),
        }
    }

    async fn pool(&self) -> Result<SqlitePool> {
        let mut guard = self.pool.lock().await;
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", self.db_path.display()))
            .map_err(|e| MessagingError::DbOpenFailed(e.to_string()))?
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| MessagingError::DbOpenFailed(e.to_string()))?;
        *guard = Some(pool.clone());
        Ok(pool)
    }

    /// One poll tick. Tries the real SQLite driver first; a permission
    /// failure to open the DB falls back to the system `sqlite3` CLI rather
    /// than surfacing as an error (§4.6 "cooperative fallback").
    pub async fn poll(&self) -> Result<Vec<InboundMessage>> {
        match self.poll_via_driver().await {
            Ok(messages) => Ok(messages),
            Err(err) => {
                tracing::warn!(%err, "falling back to sqlite3 CLI for iMessage poll");
                self.poll_via_cli().await
            }
        }
    }

    async fn poll_via_driver(&self) -> Result<Vec<InboundMessage>> {
        let pool = self.pool().await?;
        self.maybe_handle_rowid_reset(&pool).await?;

        let watermark = *self.watermark.lock().await;
        let rows = sqlx::query(SELECT_QUERY)
            .bind(watermark)
            .bind(&self.owner_address)
            .fetch_all(&pool)
            .await
            .map_err(|e| MessagingError::DbOpenFailed(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            let rowid: i64 = row.try_get("ROWID").unwrap_or_default();
            if self.is_duplicate(rowid).await {
                continue;
            }

            let text: Option<String> = row.try_get("text").ok();
            let body = match text.filter(|t| !t.trim().is_empty()) {
                Some(t) => t,
                None => {
                    let blob: Option<Vec<u8>> = row.try_get("attributedBody").ok().flatten();
                    blob.and_then(|b| decode_attributed_body(&b)).unwrap_or_default()
                }
            };
            if body.trim().is_empty() {
                continue;
            }

            let date_ns: i64 = row.try_get("date").unwrap_or_default();
            out.push(InboundMessage {
                id: rowid as u64,
                source: "imessage".into(),
                conversation_id: self.owner_address.clone(),
                sender_id: self.owner_address.clone(),
                content: MessageContent::Text(body),
                timestamp: imessage_timestamp(date_ns),
                metadata: Default::default(),
            });

            self.remember(rowid).await;
            *self.watermark.lock().await = rowid;
        }

        Ok(out)
    }

    async fn is_duplicate(&self, rowid: i64) -> bool {
        self.seen.lock().await.contains(&rowid)
    }

    async fn remember(&self, rowid: i64) {
        let mut seen = self.seen.lock().await;
        if seen.len() >= self.dedup_capacity {
            seen.pop_front();
        }
        seen.push_back(rowid);
    }

    async fn maybe_handle_rowid_reset(&self, pool: &SqlitePool) -> Result<()> {
        let row = sqlx::query("SELECT MAX(ROWID) as max_rowid FROM message")
            .fetch_one(pool)
            .await
            .map_err(|e| MessagingError::DbOpenFailed(e.to_string()))?;
        let db_max: i64 = row.try_get("max_rowid").unwrap_or(0);

        let mut watermark = self.watermark.lock().await;
        if db_max < *watermark && (*watermark - db_max) > RESET_THRESHOLD {
            tracing::warn!(db_max, old_watermark = *watermark, "iMessage ROWID reset detected, rewinding watermark");
            *watermark = (db_max - 10).max(0);
        }
        Ok(())
    }

    /// Degraded path when the primary driver can't open the DB (e.g. no
    /// Full Disk Access). Shells out to `sqlite3`; `attributedBody` can't be
    /// read this way since it's binary, so messages with empty `text` are
    /// silently skipped until the real driver recovers.
    async fn poll_via_cli(&self) -> Result<Vec<InboundMessage>> {
        let watermark = *self.watermark.lock().await;
        let query = format!(
            "SELECT m.ROWID, m.text, m.date FROM message m LEFT JOIN handle h ON m.handle_id = h.ROWID \
             WHERE m.ROWID > {watermark} AND h.id = '{}' AND m.is_from_me = 0 AND m.associated_message_type = 0 \
             ORDER BY m.ROWID ASC LIMIT {POLL_LIMIT}",
            self.owner_address.replace('\'', "''")
        );

        let output = tokio::time::timeout(
            CLI_TIMEOUT,
            tokio::process::Command::new("sqlite3")
                .arg("-separator")
                .arg("|||")
                .arg(&self.db_path)
                .arg(&query)
                .output(),
        )
        .await
        .map_err(|_| MessagingError::CliFallbackFailed("timed out".into()))?
        .map_err(|e| MessagingError::CliFallbackFailed(e.to_string()))?;

        if !output.status.success() {
            return Err(MessagingError::CliFallbackFailed(String::from_utf8_lossy(&output.stderr).into_owned()).into());
        }

        let mut out = Vec::new();
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            let mut parts = line.splitn(3, "|||");
            let Some(rowid) = parts.next().and_then(|s| s.parse::<i64>().ok()) else { continue };
            let text = parts.next().unwrap_or_default().trim();
            let date_ns = parts.next().and_then(|s| s.parse::<i64>().ok()).unwrap_or_default();
            if text.is_empty() || self.is_duplicate(rowid).await {
                continue;
            }

            out.push(InboundMessage {
                id: rowid as u64,
                source: "imessage".into(),
                conversation_id: self.owner_address.clone(),
                sender_id: self.owner_address.clone(),
                content: MessageContent::Text(text.to_string()),
                timestamp: imessage_timestamp(date_ns),
                metadata: Default::default(),
            });
            self.remember(rowid).await;
            *self.watermark.lock().await = rowid;
        }
        Ok(out)
    }
}

/// `message.date` is nanoseconds since the Apple epoch (2001-01-01), not
/// the Unix epoch.
fn imessage_timestamp(date_ns: i64) -> chrono::DateTime<chrono::Utc> {
    const APPLE_EPOCH_OFFSET_SECS: i64 = 978_307_200;
    let secs = date_ns / 1_000_000_000 + APPLE_EPOCH_OFFSET_SECS;
    chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
}

const TYPED_STREAM_MARKER: &[u8] = b"NSString\x01\x94\x84\x01+";
const FALLBACK_DELIMITER: &[u8] = b"\x86\x84";

/// Decodes a `NSKeyedArchiver` typed-stream `attributedBody` BLOB enough to
/// pull out the plain message text (§6). Not a general NSKeyedArchiver
/// decoder — just the one shape iMessage actually writes.
fn decode_attributed_body(bytes: &[u8]) -> Option<String> {
    if let Some(pos) = find_subslice(bytes, TYPED_STREAM_MARKER) {
        let after = pos + TYPED_STREAM_MARKER.len();
        if after >= bytes.len() {
            return None;
        }
        let len_byte = bytes[after];
        let (len, start) = if len_byte < 0x81 {
            (len_byte as usize, after + 1)
        } else if len_byte == 0x81 && after + 2 <= bytes.len() {
            (bytes[after + 1] as usize, after + 2)
        } else if len_byte == 0x82 && after + 3 <= bytes.len() {
            (u16::from_be_bytes([bytes[after + 1], bytes[after + 2]]) as usize, after + 3)
        } else {
            return None;
        };
        let end = (start + len).min(bytes.len());
        if start < end {
            if let Ok(text) = String::from_utf8(bytes[start..end].to_vec()) {
                return Some(text);
            }
        }
    }

    // Fallback: some typed streams omit the marker this build looks for;
    // split on the next-field delimiter and take the printable remainder.
    let pos = find_subslice(bytes, FALLBACK_DELIMITER)?;
    let rest = &bytes[pos + FALLBACK_DELIMITER.len()..];
    let text_end = rest.iter().position(|b| *b < 0x09).unwrap_or(rest.len());
    let text = String::from_utf8_lossy(&rest[..text_end]).trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_short_typed_stream_string() {
        let mut blob = Vec::new();
        blob.extend_from_slice(b"garbage-prefix");
        blob.extend_from_slice(TYPED_STREAM_MARKER);
        blob.push(5); // length byte < 0x81
        blob.extend_from_slice(b"hello");
        blob.extend_from_slice(b"trailer");
        assert_eq!(decode_attributed_body(&blob).as_deref(), Some("hello"));
    }

    #[test]
    fn decodes_0x81_length_prefixed_string() {
        let mut blob = Vec::new();
        blob.extend_from_slice(TYPED_STREAM_MARKER);
        blob.push(0x81);
        blob.push(11);
        blob.extend_from_slice(b"hello world");
        assert_eq!(decode_attributed_body(&blob).as_deref(), Some("hello world"));
    }

    #[test]
    fn falls_back_to_delimiter_split_when_marker_absent() {
        let mut blob = Vec::new();
        blob.extend_from_slice(b"header");
        blob.extend_from_slice(FALLBACK_DELIMITER);
        blob.extend_from_slice(b"plain text body");
        blob.push(0x00);
        blob.extend_from_slice(b"trailer");
        assert_eq!(decode_attributed_body(&blob).as_deref(), Some("plain text body"));
    }

    #[test]
    fn returns_none_for_empty_blob() {
        assert_eq!(decode_attributed_body(&[]), None);
    }

    #[test]
    fn apple_epoch_conversion_matches_unix_offset() {
        let ts = imessage_timestamp(0);
        assert_eq!(ts.timestamp(), 978_307_200);
    }
}
