use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use thiserror::Error;
use tracing::warn;

use crate::search::ResultRecord;

/// File name endings picked up when scanning a directory (each also with `.gz`).
pub const TREE_EXTENSIONS: [&str; 5] = [".tre", ".tree", ".nex", ".nxs", ".treefile"];

/// Output file used when none is given.
pub const DEFAULT_OUTPUT: &str = "bootstraps.csv";

lazy_static! {
    static ref SCIENTIFIC_RE: Regex = Regex::new(r"\d\.\d+E-\d+").unwrap();
    static ref LABEL_RE: Regex = Regex::new(r"\[&label=(\d+)\]").unwrap();
    static ref LEAF_RE: Regex = Regex::new(r"([(,]\s*)([^(),:;\s]+)").unwrap();
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no tree found in {0:?}")]
    NoTree(PathBuf),
    #[error("{0} listed tree file(s) do not exist")]
    MissingFiles(usize),
    #[error("seed taxa in {path:?} are inconsistent ({undefined} undefined, {defined} defined)")]
    InconsistentSeeds {
        path: PathBuf,
        defined: usize,
        undefined: usize,
    },
}

impl InputError {
    fn io(path: &Path, source: io::Error) -> Self {
        InputError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One tree file to analyse and the seed taxon it comes with (from a list
/// file, or derived from the file name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSource {
    pub path: PathBuf,
    pub seed: Option<String>,
}

impl TreeSource {
    /// Source whose seed is derived from the file name.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let seed = Some(seed_from_filename(&path));
        TreeSource { path, seed }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Seed taxon encoded in a file name: everything before the first `.`.
///
/// `trees/Homo_sapiens.fasta.tre` → `Homo_sapiens`
pub fn seed_from_filename(path: &Path) -> String {
    let base = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    base.split('.').next().unwrap_or(base).to_string()
}

/// Strip `[&...]` comment blocks (BEAST and FigTree annotations).
fn strip_annotations(newick: &str) -> String {
    let mut result = String::with_capacity(newick.len());
    let mut in_annotation = false;
    let mut chars = newick.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '[' && chars.peek() == Some(&'&') {
            in_annotation = true;
        } else if ch == ']' && in_annotation {
            in_annotation = false;
        } else if !in_annotation {
            result.push(ch);
        }
    }

    result
}

/// Turn raw file content into the single canonical tree string the parser expects.
///
/// Plain files hold the tree on their first line. NEXUS files hold it on the
/// first bracketed line of the trees block; there tiny scientific-notation values
/// are flattened to `10.0` and `[&label=N]` support annotations become bare
/// integers. Leaf ids listed in a `TRANSLATE` block are replaced by their
/// taxon names. Returns `None` if no tree line is found.
pub fn preprocess_tree_text(content: &str) -> Option<String> {
    let mut lines = content.lines();
    let first = lines.next()?.trim_end();

    if !first.to_ascii_uppercase().starts_with("#NEXUS") {
        return (!first.trim().is_empty()).then(|| first.trim().to_string());
    }

    let tree_line = lines
        .skip_while(|line| !line.trim().to_ascii_lowercase().starts_with("begin trees;"))
        .skip(1)
        .map(str::trim)
        .find(|line| line.contains('('))?;
    let data = &tree_line[tree_line.find('(')?..];

    let data = SCIENTIFIC_RE.replace_all(data, "10.0");
    let data = LABEL_RE.replace_all(&data, "$1");
    let data = strip_annotations(&data);

    let translate = parse_translate_block(content);
    if translate.is_empty() {
        return Some(data);
    }
    Some(translate_leaves(&data, &translate))
}

/// `id -> taxon name` pairs of a NEXUS `TRANSLATE` block, e.g. `1 'Homo_sapiens',`.
fn parse_translate_block(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .skip_while(|line| !line.trim().to_ascii_uppercase().starts_with("TRANSLATE"))
        .skip(1)
        .take_while(|line| !line.trim().starts_with(';'))
        .filter_map(|line| {
            let line = line.trim().trim_end_matches([',', ';']);
            let mut parts = line.split_whitespace();
            let id = parts.next()?.to_string();
            let label = parts.next()?.trim_matches('\'').to_string();
            Some((id, label))
        })
        .collect()
}

/// Replace translated leaf ids by their names. Unknown ids are kept with a warning.
fn translate_leaves(data: &str, translate: &HashMap<String, String>) -> String {
    LEAF_RE
        .replace_all(data, |caps: &Captures| {
            let id = &caps[2];
            match translate.get(id) {
                Some(name) => format!("{}{name}", &caps[1]),
                None => {
                    warn!(leaf = id, "leaf not listed in the TRANSLATE block; kept as is");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// Read a tree file (transparently gunzipping `*.gz`) and preprocess it.
pub fn read_tree_file<P: AsRef<Path>>(path: P) -> Result<String, InputError> {
    let path = path.as_ref();
    let content = if path.to_string_lossy().ends_with(".gz") {
        let file = File::open(path).map_err(|e| InputError::io(path, e))?;
        let mut s = String::new();
        GzDecoder::new(file)
            .read_to_string(&mut s)
            .map_err(|e| InputError::io(path, e))?;
        s
    } else {
        fs::read_to_string(path).map_err(|e| InputError::io(path, e))?
    };

    preprocess_tree_text(&content).ok_or_else(|| InputError::NoTree(path.to_path_buf()))
}

fn has_tree_extension(name: &str) -> bool {
    let name = name.strip_suffix(".gz").unwrap_or(name);
    TREE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Tree files directly inside `dir`, sorted by path.
pub fn list_tree_directory<P: AsRef<Path>>(dir: P) -> Result<Vec<TreeSource>, InputError> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|e| InputError::io(dir, e))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| InputError::io(dir, e))?;
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|s| s.to_str())
            .is_some_and(has_tree_extension);
        if matches && path.is_file() {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths.into_iter().map(TreeSource::from_path).collect())
}

/// Parse a list file of `path[,seed]` lines.
///
/// Quotes around fields are removed, blank lines and `#` comments skipped.
/// Seeds must be given on every line or on none; when none are given they are
/// derived from the file names.
pub fn parse_list_file<P: AsRef<Path>>(path: P) -> Result<Vec<TreeSource>, InputError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| InputError::io(path, e))?;

    // STRUCTURE:
    // "trees/Homo_sapiens.tre","Homo_sapiens_1"
    // trees/Mus_musculus.tre
    let entries: Vec<(String, Option<String>)> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let mut parts = line.splitn(2, ',');
            let file = parts.next().unwrap_or("").trim().trim_matches('"').to_string();
            let seed = parts
                .next()
                .map(|s| s.trim().trim_matches('"').to_string())
                .filter(|s| !s.is_empty());
            (file, seed)
        })
        .collect();

    let defined = entries.iter().filter(|(_, seed)| seed.is_some()).count();
    let undefined = entries.len() - defined;
    if defined > 0 && undefined > 0 {
        return Err(InputError::InconsistentSeeds {
            path: path.to_path_buf(),
            defined,
            undefined,
        });
    }

    Ok(entries
        .into_iter()
        .map(|(file, seed)| match seed {
            Some(seed) => TreeSource {
                path: PathBuf::from(file),
                seed: Some(seed),
            },
            None => TreeSource::from_path(file),
        })
        .collect())
}

/// Paths in `sources` that are not existing files.
pub fn missing_sources(sources: &[TreeSource]) -> Vec<&Path> {
    sources
        .iter()
        .map(|s| s.path.as_path())
        .filter(|p| !p.is_file())
        .collect()
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Where CSV rows go. The gzip encoder is kept typed so its trailer can be
/// written, and its errors seen, in [`ResultWriter::finish`].
enum Sink {
    Plain(Box<dyn Write>),
    Gzip(BufWriter<GzEncoder<File>>),
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(buf),
            Sink::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Gzip(w) => w.flush(),
        }
    }
}

/// CSV writer for result records.
///
/// Every field is quoted. If the path ends with `.gz`, the output is
/// gzip-compressed.
pub struct ResultWriter {
    out: Sink,
    columns: usize,
}

impl ResultWriter {
    /// Create the file and write the header row.
    pub fn create<P: AsRef<Path>>(path: P, criteria: &[String]) -> io::Result<Self> {
        let p = path.as_ref();
        let is_gz = p.to_string_lossy().ends_with(".gz");

        let out = if is_gz {
            let f = File::create(p)?;
            let enc = GzEncoder::new(f, Compression::default());
            Sink::Gzip(BufWriter::new(enc))
        } else {
            Sink::Plain(Box::new(BufWriter::new(File::create(p)?)))
        };
        Self::start(out, criteria)
    }

    fn start(mut out: Sink, criteria: &[String]) -> io::Result<Self> {
        writeln!(out, "{}", header_row(criteria))?;
        Ok(ResultWriter {
            out,
            columns: criteria.len(),
        })
    }

    pub fn write_record(&mut self, record: &ResultRecord) -> io::Result<()> {
        if record.outcomes.len() != self.columns {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "record for {} has {} outcomes, header has {} criteria",
                    record.file,
                    record.outcomes.len(),
                    self.columns
                ),
            ));
        }
        writeln!(self.out, "{}", record_row(record))
    }

    /// Flush all rows; for gzip output also write the trailer.
    pub fn finish(self) -> io::Result<()> {
        match self.out {
            Sink::Plain(mut w) => w.flush(),
            Sink::Gzip(w) => {
                let encoder = w.into_inner().map_err(io::IntoInnerError::into_error)?;
                encoder.finish()?.flush()
            }
        }
    }
}

/// Column names: `filename, seed_taxon, total_taxons, {NAME, tu_R, tu_A}*`.
pub fn header_row_fields(criteria: &[String]) -> Vec<String> {
    ["filename", "seed_taxon", "total_taxons"]
        .into_iter()
        .map(str::to_string)
        .chain(
            criteria
                .iter()
                .flat_map(|name| [name.clone(), "tu_R".to_string(), "tu_A".to_string()]),
        )
        .collect()
}

/// Unquoted fields of one data row; absent outcomes leave their three fields empty.
pub fn record_row_fields(record: &ResultRecord) -> Vec<String> {
    let head = [
        record.file.clone(),
        record.seed.clone().unwrap_or_default(),
        record.total_taxa.to_string(),
    ];
    let outcomes = record.outcomes.iter().flat_map(|o| match o {
        Some(o) => [
            o.bootstrap.to_string(),
            o.relative_used.to_string(),
            o.absolute_used.to_string(),
        ],
        None => [String::new(), String::new(), String::new()],
    });
    head.into_iter().chain(outcomes).collect()
}

pub fn header_row(criteria: &[String]) -> String {
    header_row_fields(criteria).iter().map(|f| quote(f)).join(",")
}

pub fn record_row(record: &ResultRecord) -> String {
    record_row_fields(record).iter().map(|f| quote(f)).join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::Outcome;
    use crate::tree::{EdgeId, Side};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tree-sorter-io-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn plain_file_uses_first_line() {
        let text = "(A:0.1,(B,C)90,D);\nsecond line ignored\n";
        assert_eq!(preprocess_tree_text(text).unwrap(), "(A:0.1,(B,C)90,D);");
        assert_eq!(preprocess_tree_text(""), None);
    }

    #[test]
    fn nexus_translate_block_names_the_leaves() {
        let text = "#NEXUS\nbegin trees;\n  translate\n    1 'Homo_sapiens',\n    2 Pan_troglodytes,\n    3 'Mus_musculus',\n    4 Rattus\n  ;\n  tree t = [&U] (1:0.1,(2:0.1,3:0.2)[&label=87]:0.3,4:0.4);\nend;\n";
        let data = preprocess_tree_text(text).unwrap();
        assert_eq!(
            data,
            "(Homo_sapiens:0.1,(Pan_troglodytes:0.1,Mus_musculus:0.2)87:0.3,Rattus:0.4);"
        );

        let tree = crate::newick::parse_newick(&data).unwrap();
        let mut names: Vec<_> = tree.taxon_names().collect();
        names.sort();
        assert_eq!(names, vec!["Homo_sapiens", "Mus_musculus", "Pan_troglodytes", "Rattus"]);
    }

    #[test]
    fn nexus_without_translate_keeps_labels() {
        let text = "#NEXUS\nbegin trees;\ntree t = (10,(20,30)5,40);\nend;\n";
        assert_eq!(preprocess_tree_text(text).unwrap(), "(10,(20,30)5,40);");
    }

    #[test]
    fn nexus_is_unwrapped_and_normalised() {
        let text = "#NEXUS\nbegin taxa;\nend;\nbegin trees;\n  tree tree_1 = [&U] (A:1.2E-05,(B:0.1,C:0.2)[&label=87]:0.3,D:0.4);\nend;\n";
        assert_eq!(
            preprocess_tree_text(text).unwrap(),
            "(A:10.0,(B:0.1,C:0.2)87:0.3,D:0.4);"
        );
    }

    #[test]
    fn beast_annotations_are_stripped() {
        assert_eq!(
            strip_annotations("(A[&rate=0.1]:1.0,B:2.0)[&posterior=1.0]77;"),
            "(A:1.0,B:2.0)77;"
        );
    }

    #[test]
    fn seed_from_name() {
        assert_eq!(seed_from_filename(Path::new("dir/Homo_sapiens.fasta.tre")), "Homo_sapiens");
        assert_eq!(seed_from_filename(Path::new("plain")), "plain");
    }

    #[test]
    fn directory_listing_filters_and_sorts() {
        let dir = scratch_dir("list");
        for name in ["b.tre", "a.nex", "c.treefile.gz", "notes.txt"] {
            fs::write(dir.join(name), "(A,B,C);").unwrap();
        }
        let sources = list_tree_directory(&dir).unwrap();
        let names: Vec<_> = sources.iter().map(TreeSource::file_name).collect();
        assert_eq!(names, vec!["a.nex", "b.tre", "c.treefile.gz"]);
        assert_eq!(sources[0].seed.as_deref(), Some("a"));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn list_file_seeds_all_or_none() {
        let dir = scratch_dir("listfile");

        let with_seeds = dir.join("with.csv");
        fs::write(&with_seeds, "# comment\n\"x/one.tre\",\"S1\"\nx/two.tre,S2\n").unwrap();
        let sources = parse_list_file(&with_seeds).unwrap();
        assert_eq!(
            sources,
            vec![
                TreeSource { path: PathBuf::from("x/one.tre"), seed: Some("S1".into()) },
                TreeSource { path: PathBuf::from("x/two.tre"), seed: Some("S2".into()) },
            ]
        );

        let without = dir.join("without.csv");
        fs::write(&without, "x/Homo.tre\n\nx/Mus.fasta.tre\n").unwrap();
        let sources = parse_list_file(&without).unwrap();
        assert_eq!(sources[1].seed.as_deref(), Some("Mus"));

        let mixed = dir.join("mixed.csv");
        fs::write(&mixed, "a.tre,S1\nb.tre\n").unwrap();
        assert!(matches!(
            parse_list_file(&mixed),
            Err(InputError::InconsistentSeeds { defined: 1, undefined: 1, .. })
        ));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn gzip_input_is_decompressed() {
        let dir = scratch_dir("gz");
        let path = dir.join("t.tre.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(b"(A,(B,C)90,D);\n").unwrap();
        enc.finish().unwrap();

        assert_eq!(read_tree_file(&path).unwrap(), "(A,(B,C)90,D);");
        assert!(matches!(
            read_tree_file(dir.join("missing.tre")),
            Err(InputError::Io { .. })
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn rows_are_quoted_and_absent_outcomes_empty() {
        let names = vec!["grp".to_string(), "other".to_string()];
        assert_eq!(
            header_row(&names),
            r#""filename","seed_taxon","total_taxons","grp","tu_R","tu_A","other","tu_R","tu_A""#
        );

        let record = ResultRecord {
            file: "four.tre".into(),
            seed: None,
            total_taxa: 4,
            outcomes: vec![
                Some(Outcome {
                    bootstrap: 90,
                    relative_used: 0.25,
                    absolute_used: 1,
                    subtree_size: 4,
                    edge: EdgeId(0),
                    side: Side::Distal,
                }),
                None,
            ],
        };
        assert_eq!(
            record_row(&record),
            r#""four.tre","","4","90","0.25","1","","","""#
        );
    }

    #[test]
    fn gzip_output_is_complete() {
        let dir = scratch_dir("gzout");
        let path = dir.join("out.csv.gz");
        let names = vec!["grp".to_string()];

        let mut w = ResultWriter::create(&path, &names).unwrap();
        w.write_record(&ResultRecord {
            file: "a.tre".into(),
            seed: None,
            total_taxa: 4,
            outcomes: vec![None],
        })
        .unwrap();
        w.finish().unwrap();

        let mut written = String::new();
        GzDecoder::new(File::open(&path).unwrap())
            .read_to_string(&mut written)
            .unwrap();
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines, vec![
            r#""filename","seed_taxon","total_taxons","grp","tu_R","tu_A""#,
            r#""a.tre","","4","","","""#,
        ]);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn writer_emits_header_and_rows() {
        let dir = scratch_dir("writer");
        let path = dir.join("out.csv");
        let names = vec!["grp".to_string()];

        let mut w = ResultWriter::create(&path, &names).unwrap();
        w.write_record(&ResultRecord {
            file: "a\"b.tre".into(),
            seed: Some("A".into()),
            total_taxa: 3,
            outcomes: vec![None],
        })
        .unwrap();
        let bad = ResultRecord {
            file: "x".into(),
            seed: None,
            total_taxa: 3,
            outcomes: vec![],
        };
        assert!(w.write_record(&bad).is_err());
        w.finish().unwrap();

        let written = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], r#""a""b.tre","A","3","","","""#);
        fs::remove_dir_all(&dir).unwrap();
    }
}
