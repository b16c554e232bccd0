use std::collections::HashMap;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use preseea_downloader::app::{App, CrawlOptions, CrawlSummary, ProgressEvent, ProgressSink};
use preseea_downloader::config::{Config, ConfigLoader, CrawlOverrides, ResolvedConfig};
use preseea_downloader::corpus::{CorpusClient, SearchQuery};
use preseea_downloader::error::PreseeaError;
use preseea_downloader::store::Store;

/// Silent MPEG-1 Layer III frames (128 kbit/s, 44.1 kHz).
fn silent_mp3() -> Vec<u8> {
    let mut frame = vec![0u8; 417];
    frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
    frame.repeat(40)
}

fn results_page(rows: &[(&str, &str)], has_next: bool) -> String {
    let mut html = String::from("<html><body><table>");
    html.push_str("<tr><th>Muestra</th><th>Texto</th><th>País</th><th>Archivos</th></tr>");
    for (id, country) in rows {
        html.push_str(&format!(
            "<tr><td><a href=\"javascript:ampliar('{id}')\" title=\"Ampliar contexto\">{id}</a></td>\
             <td>... texto ...</td><td>{country}</td>\
             <td><a href=\"mp3/{id}.mp3\">mp3</a> <a href=\"txt/{id}.txt\">txt</a></td></tr>"
        ));
    }
    html.push_str("</table>");
    if has_next {
        html.push_str(
            "<a href=\"javascript:buscando(1)\" style=\"text-decoration:none;\">Siguientes &gt;&gt;</a>",
        );
    }
    html.push_str("</body></html>");
    html
}

#[derive(Default)]
struct MockCorpus {
    pages: Vec<String>,
    files: HashMap<String, Vec<u8>>,
    failures: Mutex<HashMap<String, usize>>,
    fail_page: Option<u32>,
    page_requests: Mutex<Vec<u32>>,
    downloads: Mutex<Vec<String>>,
}

impl MockCorpus {
    fn with_rows(pages: Vec<Vec<(&str, &str)>>) -> Self {
        let count = pages.len();
        let mut files = HashMap::new();
        let mut html = Vec::new();
        for (index, rows) in pages.iter().enumerate() {
            for (id, _) in rows {
                files.insert(format!("mp3/{id}.mp3"), silent_mp3());
                files.insert(
                    format!("txt/{id}.txt"),
                    format!("<H1> transcripción de {id}\n<H2> sí\n").into_bytes(),
                );
            }
            html.push(results_page(rows, index + 1 < count));
        }
        Self {
            pages: html,
            files,
            ..Self::default()
        }
    }

    fn fail_times(self, remote: &str, times: usize) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(remote.to_string(), times);
        self
    }

    fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

impl CorpusClient for MockCorpus {
    fn fetch_page(&self, _query: &SearchQuery, page: u32) -> Result<String, PreseeaError> {
        self.page_requests.lock().unwrap().push(page);
        if self.fail_page == Some(page) {
            return Err(PreseeaError::PageStatus {
                page,
                status: 500,
                message: "mock failure".to_string(),
            });
        }
        self.pages
            .get(page as usize)
            .cloned()
            .ok_or(PreseeaError::PageStatus {
                page,
                status: 404,
                message: "no such page".to_string(),
            })
    }

    fn download(&self, remote: &str, destination: &Utf8Path) -> Result<u64, PreseeaError> {
        self.downloads.lock().unwrap().push(remote.to_string());
        if let Some(remaining) = self.failures.lock().unwrap().get_mut(remote) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PreseeaError::DownloadStatus {
                    url: remote.to_string(),
                    status: 503,
                });
            }
        }
        let body = self
            .files
            .get(remote)
            .ok_or_else(|| PreseeaError::DownloadStatus {
                url: remote.to_string(),
                status: 404,
            })?;
        Store::write_bytes_atomic(destination, body)?;
        Ok(body.len() as u64)
    }
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn count(&self, prefix: &str) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|message| message.starts_with(prefix))
            .count()
    }
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

fn config(overrides: CrawlOverrides) -> ResolvedConfig {
    ConfigLoader::resolve_config(Config::default(), overrides).unwrap()
}

fn sandbox() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

fn crawl_with(
    root: &Utf8Path,
    corpus: &MockCorpus,
    overrides: CrawlOverrides,
    sink: &RecordingSink,
) -> Result<CrawlSummary, PreseeaError> {
    let config = config(overrides);
    let store = Store::new(root.to_path_buf(), &config);
    App::new(store, corpus, &config).crawl(CrawlOptions::default(), sink)
}

fn crawl(root: &Utf8Path, corpus: &MockCorpus) -> CrawlSummary {
    crawl_with(root, corpus, CrawlOverrides::default(), &RecordingSink::default()).unwrap()
}

fn read(path: Utf8PathBuf) -> Vec<u8> {
    std::fs::read(path.as_std_path()).unwrap()
}

impl CorpusClient for &MockCorpus {
    fn fetch_page(&self, query: &SearchQuery, page: u32) -> Result<String, PreseeaError> {
        (**self).fetch_page(query, page)
    }

    fn download(&self, remote: &str, destination: &Utf8Path) -> Result<u64, PreseeaError> {
        (**self).download(remote, destination)
    }
}

#[test]
fn single_row_builds_dataset() {
    let (_temp, root) = sandbox();
    let corpus = MockCorpus::with_rows(vec![vec![("H21F", "España")]]);

    let summary = crawl(&root, &corpus);

    let raw_audio = root.join("preseea/España/H21F.mp3");
    assert!(raw_audio.as_std_path().is_file());
    assert!(root.join("preseea/España/H21F.txt").as_std_path().is_file());
    assert_eq!(read(root.join("data/H21F.mp3")), read(raw_audio));
    assert_eq!(
        String::from_utf8(read(root.join("metadata.csv"))).unwrap(),
        "file_name,transcription\ndata/H21F.mp3,<H1> transcripción de H21F <H2> sí\n"
    );
    assert_eq!(summary.pages, 1);
    assert_eq!(summary.pairs, 1);
    assert_eq!(summary.total_downloaded(), 2);
    assert_eq!(summary.manifest_rows, 1);
    assert_eq!(summary.incomplete_pairs, 0);
}

#[test]
fn second_run_downloads_nothing() {
    let (_temp, root) = sandbox();
    let corpus = MockCorpus::with_rows(vec![vec![("H21F", "España"), ("H22M", "España")]]);

    crawl(&root, &corpus);
    let first_manifest = read(root.join("metadata.csv"));
    assert_eq!(corpus.downloads().len(), 4);

    let sink = RecordingSink::default();
    let summary = crawl_with(&root, &corpus, CrawlOverrides::default(), &sink).unwrap();

    assert_eq!(corpus.downloads().len(), 4);
    assert_eq!(summary.total_downloaded(), 0);
    assert_eq!(summary.already_present, 4);
    assert_eq!(sink.count("Already exists"), 4);
    assert_eq!(summary.flat_copies, 0);
    assert_eq!(read(root.join("metadata.csv")), first_manifest);
}

#[test]
fn zero_byte_audio_is_replaced() {
    let (_temp, root) = sandbox();
    let corpus = MockCorpus::with_rows(vec![vec![("H21F", "España")]]);
    let dir = root.join("preseea/España");
    std::fs::create_dir_all(dir.as_std_path()).unwrap();
    std::fs::write(dir.join("H21F.mp3").as_std_path(), b"").unwrap();
    std::fs::write(dir.join("H21F.txt").as_std_path(), b"ya estaba").unwrap();

    let sink = RecordingSink::default();
    let summary = crawl_with(&root, &corpus, CrawlOverrides::default(), &sink).unwrap();

    assert_eq!(summary.corrupted, 1);
    assert_eq!(sink.count("Corrupted audio"), 1);
    assert_eq!(corpus.downloads(), vec!["mp3/H21F.mp3".to_string()]);
    assert_eq!(read(dir.join("H21F.mp3")), silent_mp3());
    assert_eq!(read(root.join("data/H21F.mp3")), silent_mp3());
}

#[test]
fn corrupted_audio_retried_by_reconciliation() {
    let (_temp, root) = sandbox();
    let corpus =
        MockCorpus::with_rows(vec![vec![("H21F", "España")]]).fail_times("mp3/H21F.mp3", 1);
    let dir = root.join("preseea/España");
    std::fs::create_dir_all(dir.as_std_path()).unwrap();
    std::fs::write(dir.join("H21F.mp3").as_std_path(), b"").unwrap();

    let summary = crawl(&root, &corpus);

    assert_eq!(summary.corrupted, 1);
    assert_eq!(summary.crawl.failed, 1);
    assert_eq!(summary.reconciliation.queued, 1);
    assert_eq!(summary.reconciliation.downloaded, 1);
    assert_eq!(read(dir.join("H21F.mp3")), silent_mp3());
    assert_eq!(read(root.join("data/H21F.mp3")), silent_mp3());
    assert_eq!(summary.manifest_rows, 1);
}

#[test]
fn corrupted_audio_that_never_downloads_is_excluded() {
    let (_temp, root) = sandbox();
    let corpus =
        MockCorpus::with_rows(vec![vec![("H21F", "España")]]).fail_times("mp3/H21F.mp3", 2);
    let dir = root.join("preseea/España");
    std::fs::create_dir_all(dir.as_std_path()).unwrap();
    std::fs::write(dir.join("H21F.mp3").as_std_path(), b"").unwrap();

    let summary = crawl(&root, &corpus);

    assert_eq!(summary.reconciliation.queued, 1);
    assert_eq!(summary.reconciliation.failed, 1);
    assert_eq!(summary.manifest_rows, 0);
    assert_eq!(summary.incomplete_pairs, 1);
    assert!(!root.join("data/H21F.mp3").as_std_path().exists());
    assert_eq!(
        String::from_utf8(read(root.join("metadata.csv"))).unwrap(),
        "file_name,transcription\n"
    );
}

#[test]
fn repeated_row_on_one_page_is_planned_once() {
    let (_temp, root) = sandbox();
    let corpus = MockCorpus::with_rows(vec![vec![("H21F", "España"), ("H21F", "España")]]);

    let sink = RecordingSink::default();
    let summary = crawl_with(&root, &corpus, CrawlOverrides::default(), &sink).unwrap();

    assert_eq!(summary.rows, 2);
    assert_eq!(summary.pairs, 1);
    assert_eq!(sink.count("Queueing"), 2);
    assert_eq!(corpus.downloads().len(), 2);
    assert_eq!(summary.manifest_rows, 1);

    let sink = RecordingSink::default();
    let summary = crawl_with(&root, &corpus, CrawlOverrides::default(), &sink).unwrap();
    assert_eq!(summary.already_present, 2);
    assert_eq!(sink.count("Already exists"), 2);
}

#[test]
fn reconciliation_recovers_missing_transcript() {
    let (_temp, root) = sandbox();
    let corpus =
        MockCorpus::with_rows(vec![vec![("H21F", "España")]]).fail_times("txt/H21F.txt", 1);

    let summary = crawl(&root, &corpus);

    assert_eq!(summary.crawl.failed, 1);
    assert_eq!(summary.reconciliation.queued, 1);
    assert_eq!(summary.reconciliation.downloaded, 1);
    assert_eq!(summary.manifest_rows, 1);
    let manifest = String::from_utf8(read(root.join("metadata.csv"))).unwrap();
    assert!(manifest.contains("data/H21F.mp3,"));
}

#[test]
fn failed_retry_excludes_pair() {
    let (_temp, root) = sandbox();
    let corpus = MockCorpus::with_rows(vec![vec![("A1", "Chile"), ("B2", "Chile")]])
        .fail_times("txt/B2.txt", 2);

    let summary = crawl(&root, &corpus);

    assert_eq!(summary.reconciliation.failed, 1);
    assert_eq!(summary.total_failed(), 2);
    assert_eq!(summary.manifest_rows, 1);
    assert_eq!(summary.incomplete_pairs, 1);
    let manifest = String::from_utf8(read(root.join("metadata.csv"))).unwrap();
    assert!(manifest.contains("data/A1.mp3,"));
    assert!(!manifest.contains("B2"));
    assert!(root.join("preseea/Chile/B2.mp3").as_std_path().is_file());
    assert!(!root.join("data/B2.mp3").as_std_path().exists());
}

#[test]
fn follows_pages_in_order() {
    let (_temp, root) = sandbox();
    let corpus = MockCorpus::with_rows(vec![
        vec![("P0A", "Chile"), ("P0B", "Perú")],
        vec![("P1A", "España")],
        vec![("P2A", "México")],
    ]);

    let summary = crawl(&root, &corpus);

    assert_eq!(summary.pages, 3);
    assert_eq!(*corpus.page_requests.lock().unwrap(), vec![0, 1, 2]);
    let manifest = String::from_utf8(read(root.join("metadata.csv"))).unwrap();
    let names: Vec<&str> = manifest
        .lines()
        .skip(1)
        .map(|line| line.split(',').next().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["data/P0A.mp3", "data/P0B.mp3", "data/P1A.mp3", "data/P2A.mp3"]
    );
}

#[test]
fn page_limit_stops_traversal() {
    let (_temp, root) = sandbox();
    let corpus = MockCorpus::with_rows(vec![
        vec![("P0A", "Chile")],
        vec![("P1A", "Chile")],
        vec![("P2A", "Chile")],
    ]);
    let overrides = CrawlOverrides {
        max_pages: Some(2),
        ..CrawlOverrides::default()
    };

    let summary = crawl_with(&root, &corpus, overrides, &RecordingSink::default()).unwrap();

    assert_eq!(summary.pages, 2);
    assert_eq!(summary.manifest_rows, 2);
}

#[test]
fn page_failure_is_fatal() {
    let (_temp, root) = sandbox();
    let mut corpus = MockCorpus::with_rows(vec![vec![("P0A", "Chile")], vec![("P1A", "Chile")]]);
    corpus.fail_page = Some(1);

    let err = crawl_with(
        &root,
        &corpus,
        CrawlOverrides::default(),
        &RecordingSink::default(),
    )
    .unwrap_err();

    assert_matches!(err, PreseeaError::PageStatus { page: 1, status: 500, .. });
    assert!(root.join("preseea/Chile/P0A.mp3").as_std_path().is_file());
    assert!(!root.join("metadata.csv").as_std_path().exists());
}

#[test]
fn parallel_workers_fetch_everything() {
    let (_temp, root) = sandbox();
    let ids: Vec<String> = (0..12).map(|n| format!("U{n:02}")).collect();
    let rows: Vec<(&str, &str)> = ids.iter().map(|id| (id.as_str(), "Colombia")).collect();
    let corpus = MockCorpus::with_rows(vec![rows]);
    let overrides = CrawlOverrides {
        concurrent: Some(4),
        ..CrawlOverrides::default()
    };

    let summary = crawl_with(&root, &corpus, overrides, &RecordingSink::default()).unwrap();

    assert_eq!(summary.workers, 4);
    assert_eq!(summary.crawl.downloaded, 24);
    assert_eq!(summary.manifest_rows, 12);
    assert_eq!(corpus.downloads().len(), 24);
}

#[test]
fn skip_manifest_leaves_no_dataset() {
    let (_temp, root) = sandbox();
    let corpus = MockCorpus::with_rows(vec![vec![("H21F", "España")]]);
    let config = config(CrawlOverrides::default());
    let store = Store::new(root.clone(), &config);

    let summary = App::new(store, &corpus, &config)
        .crawl(
            CrawlOptions {
                skip_manifest: true,
            },
            &RecordingSink::default(),
        )
        .unwrap();

    assert_eq!(summary.total_downloaded(), 2);
    assert_eq!(summary.manifest_path, None);
    assert!(!root.join("metadata.csv").as_std_path().exists());
    assert!(!root.join("data").as_std_path().exists());
}
