//! 완성된 파일 저장
//!
//! 완성 핸들러는 수신 루프 안에서 동기적으로 불리므로 디스크 쓰기는 채널로 넘겨
//! 별도 태스크에서 처리한다.

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::file::File;
use crate::packet::FileId;
use crate::{Error, Result};

/// 저장 경로: `<dir>/<file_id>.bin`
pub fn completed_path(dir: &Path, file_id: FileId) -> PathBuf {
    dir.join(format!("{}.bin", file_id))
}

/// 완성된 파일을 디렉토리에 쓴다
pub fn write_completed(dir: &Path, file: &File) -> Result<PathBuf> {
    if !file.is_full() {
        return Err(Error::Incomplete {
            file_id: file.id(),
            acked: file.size() as usize,
            total: file.capacity() as usize,
        });
    }

    let path = completed_path(dir, file.id());
    let out = fs::File::create(&path)?;
    file.write_to(BufWriter::new(out))?;
    Ok(path)
}

/// 저장 태스크 시작
///
/// 송신측 채널이 모두 닫히면 남은 파일을 다 쓰고 종료한다.
pub fn spawn_writer(dir: PathBuf) -> (mpsc::UnboundedSender<File>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<File>();

    let task = tokio::spawn(async move {
        while let Some(file) = rx.recv().await {
            let dir = dir.clone();
            let file_id = file.id();
            match tokio::task::spawn_blocking(move || write_completed(&dir, &file)).await {
                Ok(Ok(path)) => info!("Saved file {} to {:?}", file_id, path),
                Ok(Err(e)) => error!("Failed to save file {}: {}", file_id, e),
                Err(e) => error!("Writer for file {} panicked: {}", file_id, e),
            }
        }
    });

    (tx, task)
}
