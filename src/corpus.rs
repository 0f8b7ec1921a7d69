//! Coupon corpus loader.
//!
//! Scans a directory (one level deep) of plain-text files, treats every line
//! containing a run of 8 to 10 word characters as a coupon code, and records
//! which files each code appeared in. The stored code is the whole line. A run
//! either seeds the whole corpus or nothing: all writes share one unit of work,
//! and a file that cannot be opened or read aborts it. Bytes that are not
//! UTF-8 are replaced, not rejected.

use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, info_span, Instrument, Span};

use crate::coupons::CouponRepository;
use crate::error::SeedError;
use crate::unit_of_work::finish;
use crate::{UnitOfWork, UnitOfWorkSession};

/// A line is a coupon when it contains a run of 8 to 10 ASCII word characters.
pub const COUPON_CODE_PATTERN: &str = r"[A-Za-z0-9_]{8,10}";

/// Matches corpus lines against [`COUPON_CODE_PATTERN`].
#[derive(Debug, Clone)]
pub struct CouponPattern {
    regex: Regex,
}

impl Default for CouponPattern {
    fn default() -> Self {
        Self {
            regex: Regex::new(COUPON_CODE_PATTERN).expect("coupon code pattern compiles"),
        }
    }
}

impl CouponPattern {
    /// Returns the coupon code carried by `line`, if any: the line itself,
    /// without its terminator.
    pub fn extract<'a>(&self, line: &'a str) -> Option<&'a str> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || !self.regex.is_match(line) {
            return None;
        }
        Some(line)
    }
}

/// Summary of one loader run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub files: usize,
    pub matched_lines: usize,
    /// Coupon-source links created by this run; zero on a re-run.
    pub new_links: usize,
}

/// Lists the regular files directly inside `dir`, sorted by path.
/// Subdirectories are skipped without being entered.
pub async fn list_corpus_files(dir: &Path) -> Result<Vec<PathBuf>, SeedError> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(SeedError::MissingDirectory(dir.to_path_buf())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(SeedError::MissingDirectory(dir.to_path_buf()));
        }
        Err(source) => {
            return Err(SeedError::ReadDirectory {
                path: dir.to_path_buf(),
                source,
            });
        }
    }

    let read_dir_err = |source: std::io::Error| SeedError::ReadDirectory {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_dir_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_dir_err)? {
        let path = entry.path();
        // Follows symlinks, so a link to a directory is skipped like a directory.
        // An entry that cannot be inspected is kept; opening it reports the failure.
        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.is_dir() {
                debug!(path = %path.display(), "skipping subdirectory");
                continue;
            }
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

pub struct CouponCorpusLoader<U> {
    uow: U,
    pattern: CouponPattern,
    span: Span,
}

impl<U: UnitOfWork> CouponCorpusLoader<U> {
    pub fn new(uow: U) -> Self {
        Self {
            uow,
            pattern: CouponPattern::default(),
            span: info_span!("coupon_corpus"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Seed coupons from every file in `dir`. Safe to re-run: sources,
    /// coupons and links that already exist are reused.
    pub async fn load(&self, dir: &Path) -> Result<SeedReport, SeedError> {
        async {
            let files = list_corpus_files(dir).await?;
            let session = self.uow.begin().await?;
            let outcome = self.load_in(&session, &files).await;
            let report = finish(session, outcome).await?;

            info!(
                directory = %dir.display(),
                files = report.files,
                matched_lines = report.matched_lines,
                new_links = report.new_links,
                "coupon corpus loaded"
            );
            Ok(report)
        }
        .instrument(self.span.clone())
        .await
    }

    async fn load_in(
        &self,
        session: &U::Session,
        files: &[PathBuf],
    ) -> Result<SeedReport, SeedError> {
        let repo = CouponRepository::new(session.executor().clone());
        let mut report = SeedReport::default();

        for path in files {
            let source = repo
                .find_or_create_source(&path.to_string_lossy())
                .await?;

            let file = tokio::fs::File::open(path)
                .await
                .map_err(|source| SeedError::OpenFile {
                    path: path.clone(),
                    source,
                })?;
            let mut lines = BufReader::new(file).split(b'\n');

            let mut matched = 0usize;
            let read_err = |source: std::io::Error| SeedError::ReadFile {
                path: path.clone(),
                source,
            };
            while let Some(bytes) = lines.next_segment().await.map_err(read_err)? {
                let line = String::from_utf8_lossy(&bytes);
                let Some(code) = self.pattern.extract(&line) else {
                    continue;
                };
                matched += 1;

                let coupon_id = repo.find_or_create_coupon(code).await?;
                if repo.link_source(coupon_id, source.id).await? {
                    report.new_links += 1;
                }
            }

            debug!(path = %path.display(), matched, "coupon file scanned");
            report.files += 1;
            report.matched_lines += matched;
        }

        Ok(report)
    }
}
