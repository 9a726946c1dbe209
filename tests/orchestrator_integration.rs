//! Black-box integration tests driving the orchestrator through its public
//! API only, the way a real embedder would.

use std::collections::HashMap;
use std::sync::Arc;

use repo_fetch_core::{
    DownloadRequest, DownloadStatus, FileEntry, FilterCriteria, GitRef, InMemoryApi,
    Orchestrator, RepositoryRef, FilesystemSink,
};

fn build_request(destination: std::path::PathBuf) -> DownloadRequest {
    DownloadRequest::new(RepositoryRef::new("octo", "widgets"), GitRef::branch("main"), destination)
        .expect("non-empty destination")
}

#[tokio::test]
async fn filter_criteria_scopes_the_downloaded_set() {
    let dir = tempfile::tempdir().unwrap();

    let files = vec![
        FileEntry::new_blob("src/main.py", 200).with_download_url("u/main"),
        FileEntry::new_blob("src/test_helper.py", 200).with_download_url("u/test"),
        FileEntry::new_blob("src/docs/readme.md", 100).with_download_url("u/readme"),
    ];
    let mut contents = HashMap::new();
    contents.insert("u/main".to_string(), vec![0u8; 200]);
    contents.insert("u/test".to_string(), vec![0u8; 200]);
    contents.insert("u/readme".to_string(), vec![0u8; 100]);

    let api = InMemoryApi::new(files, contents);
    let orchestrator = Orchestrator::new(Arc::new(api), Arc::new(FilesystemSink::new()));

    let mut request = build_request(dir.path().to_path_buf());
    request.filters = FilterCriteria {
        include_globs: vec!["src/*.py".to_string()],
        exclude_globs: vec!["*/test_*.py".to_string()],
        ..Default::default()
    };

    let result = orchestrator.execute(request).await;

    assert_eq!(result.status, DownloadStatus::Completed);
    assert_eq!(result.downloaded_files, vec!["src/main.py".to_string()]);
    assert!(dir.path().join("src/main.py").exists());
    assert!(!dir.path().join("src/test_helper.py").exists());
}

#[tokio::test]
async fn flattened_structure_writes_basenames_only() {
    let dir = tempfile::tempdir().unwrap();

    let file = FileEntry::new_blob("deep/nested/path/file.txt", 10).with_download_url("u/f");
    let mut contents = HashMap::new();
    contents.insert("u/f".to_string(), vec![9u8; 10]);

    let api = InMemoryApi::new(vec![file], contents);
    let orchestrator = Orchestrator::new(Arc::new(api), Arc::new(FilesystemSink::new()));

    let mut request = build_request(dir.path().to_path_buf());
    request.preserve_structure = false;

    let result = orchestrator.execute(request).await;

    assert_eq!(result.status, DownloadStatus::Completed);
    assert!(dir.path().join("file.txt").exists());
    assert!(!dir.path().join("deep").exists());
}

#[tokio::test]
async fn concurrency_ceiling_is_honored_across_many_files() {
    let dir = tempfile::tempdir().unwrap();

    let mut files = Vec::new();
    let mut contents = HashMap::new();
    for i in 0..20 {
        let url = format!("u/{i}");
        files.push(FileEntry::new_blob(format!("file{i}.txt"), 1).with_download_url(url.clone()));
        contents.insert(url, vec![1u8]);
    }

    let api = InMemoryApi::new(files, contents);
    let orchestrator = Orchestrator::new(Arc::new(api), Arc::new(FilesystemSink::new()));

    let mut request = build_request(dir.path().to_path_buf());
    request.max_concurrent_downloads = 3;

    let result = orchestrator.execute(request).await;

    assert_eq!(result.status, DownloadStatus::Completed);
    assert_eq!(result.downloaded_files.len(), 20);
}
