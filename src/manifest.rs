use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use log::{debug, info, warn};

use crate::metrics;
use crate::store::Store;

/// 清单中每行的字段数量：id, path, label
pub const MANIFEST_FIELDS: usize = 3;

/// 一次插入请求过滤后的结果
///
/// 在调度链路中显式传递，worker 成功后据此更新台账
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertBatch {
    /// 清单文件路径
    pub manifest: PathBuf,
    /// 尚未索引的图片路径
    pub paths: Vec<String>,
    /// 因已索引而从清单中移除的行数
    pub removed: usize,
    /// 格式错误被跳过的行数
    pub malformed: usize,
}

impl InsertBatch {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// 清单中的一行及其在文件中的字节范围
struct ManifestRow {
    span: Range<usize>,
    record: Result<StringRecord, csv::Error>,
}

/// 解析清单，跳过表头
fn parse_rows(content: &str) -> Vec<ManifestRow> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = vec![];
    let mut record = StringRecord::new();
    let mut first = true;
    loop {
        let start = reader.position().byte() as usize;
        let result = reader.read_record(&mut record);
        let end = reader.position().byte() as usize;

        let record = match result {
            Ok(false) => break,
            Ok(true) => Ok(record.clone()),
            Err(e) => Err(e),
        };
        if first {
            first = false;
        } else {
            rows.push(ManifestRow { span: row_span(content.as_bytes(), start, end), record });
        }
        if end <= start {
            break;
        }
    }
    rows
}

/// 将读取器给出的范围修正为「该行内容 + 一个换行符」
///
/// CRLF 结尾时读取器可能把 `\n` 留给下一条记录，空行也会被计入下一条记录的开头
fn row_span(content: &[u8], start: usize, end: usize) -> Range<usize> {
    let is_term = |b: u8| b == b'\r' || b == b'\n';

    let mut start = start;
    while start < end && is_term(content[start]) {
        start += 1;
    }
    let mut end = end;
    while end > start && is_term(content[end - 1]) {
        end -= 1;
    }
    if content.get(end) == Some(&b'\r') {
        end += 1;
    }
    if content.get(end) == Some(&b'\n') {
        end += 1;
    }
    start..end
}

/// 行号，仅用于日志
fn line_of(content: &str, offset: usize) -> usize {
    content[..offset].matches('\n').count() + 1
}

/// 从清单中筛选出尚未索引的图片路径
///
/// 已索引的行会被直接从清单文件中删除，重复读取同一份清单时不会再次提交。
/// 此处不会写入台账，只有 worker 成功后才会记录。
///
/// NOTE: 重写清单期间如果客户端同时修改了它，客户端的修改可能丢失
pub async fn filter_new_paths(store: &Store, manifest: impl AsRef<Path>) -> Result<InsertBatch> {
    let manifest = manifest.as_ref();
    let content = tokio::fs::read_to_string(manifest)
        .await
        .with_context(|| format!("无法读取清单: {}", manifest.display()))?;

    let mut batch = InsertBatch { manifest: manifest.to_path_buf(), ..Default::default() };
    let mut seen_spans = vec![];

    for row in parse_rows(&content) {
        let record = match row.record {
            Ok(record) if record.len() == MANIFEST_FIELDS => record,
            Ok(record) => {
                let line = line_of(&content, row.span.start);
                warn!("跳过格式错误的行 {}:{}: {:?}", manifest.display(), line, record);
                batch.malformed += 1;
                continue;
            }
            Err(e) => {
                let line = line_of(&content, row.span.start);
                warn!("跳过无法解析的行 {}:{}: {}", manifest.display(), line, e);
                batch.malformed += 1;
                continue;
            }
        };

        let path = &record[1];
        if store.is_seen(path).await? {
            debug!("已索引，从清单中移除: {}", path);
            seen_spans.push(row.span);
        } else {
            batch.paths.push(path.to_string());
        }
    }

    if !seen_spans.is_empty() {
        let rewritten = remove_spans(&content, &seen_spans);
        rewrite_manifest(manifest, &rewritten).await?;
        batch.removed = seen_spans.len();
    }

    metrics::inc_manifest_rows("new", batch.paths.len());
    metrics::inc_manifest_rows("seen", batch.removed);
    metrics::inc_manifest_rows("malformed", batch.malformed);

    info!(
        "清单过滤完成 {}: 新增 {}，已索引 {}，格式错误 {}",
        manifest.display(),
        batch.paths.len(),
        batch.removed,
        batch.malformed
    );

    Ok(batch)
}

/// 删除 content 中的若干字节范围，spans 需按顺序排列且互不重叠
fn remove_spans(content: &str, spans: &[Range<usize>]) -> String {
    let mut output = String::with_capacity(content.len());
    let mut cursor = 0;
    for span in spans {
        output.push_str(&content[cursor..span.start]);
        cursor = span.end;
    }
    output.push_str(&content[cursor..]);
    output
}

/// 先写入临时文件再重命名，避免中途失败留下残缺的清单
async fn rewrite_manifest(manifest: &Path, content: &str) -> Result<()> {
    let mut tmp_file = manifest.as_os_str().to_owned();
    tmp_file.push(".tmp");
    let tmp_file = PathBuf::from(tmp_file);

    tokio::fs::write(&tmp_file, content)
        .await
        .with_context(|| format!("无法写入临时清单: {}", tmp_file.display()))?;
    tokio::fs::rename(&tmp_file, manifest)
        .await
        .with_context(|| format!("无法替换清单: {}", manifest.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::*;
    use tempfile::TempDir;

    use super::*;
    use crate::store::StoreBuilder;

    const BATCH1: &str = "id,path,label\n1,/img/a.jpg,x\n2,/img/b.jpg,y\n";

    async fn setup(manifest: &str) -> (TempDir, Store, PathBuf) {
        let dir = TempDir::new().unwrap();
        let store = StoreBuilder::new(dir.path().join("image_database.db")).open().await.unwrap();
        let path = dir.path().join("batch1.csv");
        std::fs::write(&path, manifest).unwrap();
        (dir, store, path)
    }

    #[tokio::test]
    async fn empty_ledger_keeps_every_row() {
        let (_dir, store, path) = setup(BATCH1).await;

        let batch = filter_new_paths(&store, &path).await.unwrap();
        assert_eq!(batch.paths, vec!["/img/a.jpg", "/img/b.jpg"]);
        assert_eq!(batch.removed, 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), BATCH1);
        // 过滤本身不写入台账
        assert!(!store.is_seen("/img/a.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn seen_rows_are_dropped_and_removed_from_manifest() {
        let (_dir, store, path) = setup(BATCH1).await;
        store.record_seen(&["/img/a.jpg"]).await.unwrap();

        let batch = filter_new_paths(&store, &path).await.unwrap();
        assert_eq!(batch.paths, vec!["/img/b.jpg"]);
        assert_eq!(batch.removed, 1);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "id,path,label\n2,/img/b.jpg,y\n");
        assert!(!content.contains("/img/a.jpg"));

        // 再次读取同一份清单，结果不变
        let again = filter_new_paths(&store, &path).await.unwrap();
        assert_eq!(again.paths, vec!["/img/b.jpg"]);
        assert_eq!(again.removed, 0);
    }

    #[rstest]
    #[case::too_few("id,path,label\n1,/img/a.jpg,x\n2,/img/b.jpg\n3,/img/c.jpg,z\n", 2, 1)]
    #[case::too_many("id,path,label\n1,/img/a.jpg,x,extra\n2,/img/b.jpg,y\n", 1, 1)]
    #[case::single_field("id,path,label\nbroken\n1,/img/a.jpg,x\nalso-broken\n", 1, 2)]
    #[case::blank_lines("id,path,label\n\n1,/img/a.jpg,x\n\n2,/img/b.jpg,y\n", 2, 0)]
    #[case::crlf("id,path,label\r\n1,/img/a.jpg,x\r\n2,/img/b.jpg,y\r\n", 2, 0)]
    #[case::no_trailing_newline("id,path,label\n1,/img/a.jpg,x", 1, 0)]
    #[case::header_only("id,path,label\n", 0, 0)]
    #[case::empty("", 0, 0)]
    #[tokio::test]
    async fn malformed_rows_are_skipped(
        #[case] manifest: &str,
        #[case] new: usize,
        #[case] malformed: usize,
    ) {
        let (_dir, store, path) = setup(manifest).await;

        let batch = filter_new_paths(&store, &path).await.unwrap();
        assert_eq!(batch.paths.len(), new);
        assert_eq!(batch.malformed, malformed);
    }

    #[tokio::test]
    async fn seen_row_removal_handles_crlf_and_last_line() {
        let manifest = "id,path,label\r\n1,/img/a.jpg,x\r\n2,/img/b.jpg,y";
        let (_dir, store, path) = setup(manifest).await;
        store.record_seen(&["/img/b.jpg"]).await.unwrap();

        let batch = filter_new_paths(&store, &path).await.unwrap();
        assert_eq!(batch.paths, vec!["/img/a.jpg"]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "id,path,label\r\n1,/img/a.jpg,x\r\n");
    }

    #[tokio::test]
    async fn malformed_rows_stay_in_manifest() {
        let manifest = "id,path,label\nbroken\n1,/img/a.jpg,x\n";
        let (_dir, store, path) = setup(manifest).await;
        store.record_seen(&["/img/a.jpg"]).await.unwrap();

        let batch = filter_new_paths(&store, &path).await.unwrap();
        assert!(batch.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "id,path,label\nbroken\n");
    }

    #[tokio::test]
    async fn missing_manifest_is_an_error() {
        let (dir, store, _path) = setup(BATCH1).await;
        let result = filter_new_paths(&store, dir.path().join("missing.csv")).await;
        assert!(result.is_err());
    }

    #[test]
    fn row_span_covers_exactly_one_terminator() {
        let content = b"h\r\n1,a,x\r\n\n2,b,y";
        // 读取器可能从上一行遗留的 \n 开始
        assert_eq!(row_span(content, 2, 10), 3..10);
        assert_eq!(row_span(content, 10, 16), 11..16);
        assert_eq!(line_of("h\n1,a,x\n2,b,y", 8), 3);
    }

    #[test]
    fn spans_are_removed_in_order() {
        let content = "aa\nbb\ncc\ndd\n";
        assert_eq!(remove_spans(content, &[3..6, 9..12]), "aa\ncc\n");
        assert_eq!(remove_spans(content, &[]), content);
    }
}
