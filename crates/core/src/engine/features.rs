//! Feature file discovery from glob patterns

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::vec;

use cucumber::gherkin;
use cucumber::parser::{self, Basic, Parser};
use futures::stream;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::RunError;

/// Feature files selected for a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet {
    /// Deepest directory containing every selected file
    pub base: PathBuf,
    /// Canonicalized paths
    pub files: BTreeSet<PathBuf>,
}

impl FeatureSet {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether a path reported by the engine is one of the selected files
    pub fn contains(&self, path: &Path) -> bool {
        path.canonicalize()
            .map(|p| self.files.contains(&p))
            .unwrap_or(false)
    }
}

/// Expand `patterns` relative to `root`
pub fn discover(root: &Path, patterns: &[String]) -> Result<FeatureSet, RunError> {
    let mut files = BTreeSet::new();

    for pattern in patterns {
        let full = root.join(pattern);
        let full = full.to_string_lossy().replace('\\', "/");
        let matcher = glob_to_regex(&full).map_err(|reason| RunError::FeaturePattern {
            pattern: pattern.clone(),
            reason,
        })?;

        let walk_root = static_prefix(Path::new(&full));
        if !walk_root.exists() {
            debug!(
                "Pattern {} has no base directory {}",
                pattern,
                walk_root.display()
            );
            continue;
        }

        for entry in WalkDir::new(&walk_root)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let candidate = entry.path().to_string_lossy().replace('\\', "/");
            if matcher.is_match(&candidate) {
                files.insert(entry.path().canonicalize()?);
            }
        }
    }

    let base = common_base(&files).unwrap_or_else(|| root.to_path_buf());
    debug!("Discovered {} feature files under {}", files.len(), base.display());
    Ok(FeatureSet { base, files })
}

/// Translate a glob (`**`, `*`, `?`, `{a,b}`) into an anchored regex
pub fn glob_to_regex(glob: &str) -> Result<Regex, String> {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();
    let mut in_group = false;

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("(?:.*/)?");
                } else {
                    out.push_str(".*");
                }
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '{' if !in_group => {
                in_group = true;
                out.push_str("(?:");
            }
            ',' if in_group => out.push('|'),
            '}' if in_group => {
                in_group = false;
                out.push(')');
            }
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    if in_group {
        return Err(format!("unterminated '{{' in {}", glob));
    }

    out.push('$');
    Regex::new(&out).map_err(|e| e.to_string())
}

/// Leading path components that contain no glob syntax
fn static_prefix(pattern: &Path) -> PathBuf {
    let mut prefix = PathBuf::new();
    for component in pattern.components() {
        let text = component.as_os_str().to_string_lossy();
        if text.contains(['*', '?', '{', '[']) {
            break;
        }
        prefix.push(component);
    }
    // a pattern naming one file exactly
    if prefix.is_file() {
        if let Some(parent) = prefix.parent() {
            return parent.to_path_buf();
        }
    }
    prefix
}

fn common_base(files: &BTreeSet<PathBuf>) -> Option<PathBuf> {
    let mut dirs = files.iter().filter_map(|f| f.parent());
    let first: Vec<Component<'_>> = dirs.next()?.components().collect();
    let shared = dirs.fold(first.len(), |len, dir| {
        first
            .iter()
            .zip(dir.components())
            .take(len)
            .take_while(|(a, b)| *a == b)
            .count()
    });
    Some(first[..shared].iter().collect())
}

/// Feature parser that optionally shuffles features and the scenarios
/// inside them before the engine sees them
#[derive(Debug, Default)]
pub struct FeatureParser {
    basic: Basic,
    shuffle: bool,
}

impl FeatureParser {
    pub fn new(shuffle: bool) -> Self {
        Self {
            basic: Basic::default(),
            shuffle,
        }
    }
}

impl<I: AsRef<Path>> Parser<I> for FeatureParser {
    type Cli = parser::basic::Cli;
    type Output = stream::Iter<vec::IntoIter<parser::Result<gherkin::Feature>>>;

    fn parse(self, input: I, cli: Self::Cli) -> Self::Output {
        let mut features: Vec<_> = self.basic.parse(input, cli).into_inner().collect();
        if self.shuffle {
            shuffle(&mut features, &mut rand::thread_rng());
        }
        stream::iter(features)
    }
}

/// Randomize feature order, then scenario order within each feature and rule
fn shuffle<R: Rng>(features: &mut [parser::Result<gherkin::Feature>], rng: &mut R) {
    features.shuffle(rng);
    for feature in features.iter_mut().flatten() {
        feature.scenarios.shuffle(rng);
        for rule in &mut feature.rules {
            rule.scenarios.shuffle(rng);
        }
    }
    debug!("Shuffled {} features", features.len());
}
