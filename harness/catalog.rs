//! # Pathway Catalog
//!
//! The catalog is supplied by an external loader and consumed read-only by the
//! engine. This module validates what the loader hands over (non-empty gene sets,
//! unique terms) and derives the gene universe that defines the simulated column
//! space.
//!
//! `GmtCatalog` is a minimal reader for the tab-separated GMT layout used by the
//! command-line tool. The engine itself only depends on the `CatalogSource` trait.

use ahash::{AHashMap, AHashSet};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Pathway '{0}' has an empty gene set.")]
    EmptyPathway(String),
    #[error("Pathway term '{0}' appears more than once in the catalog.")]
    DuplicateTerm(String),
    #[error("A pathway with an empty term identifier was supplied.")]
    EmptyTerm,
    #[error("The pathway catalog contains no pathways.")]
    EmptyCatalog,
    #[error("Failed to read pathway catalog '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Line {line} of '{}' is not a valid GMT record: {reason}", path.display())]
    MalformedLine {
        path: PathBuf,
        line: usize,
        reason: &'static str,
    },
}

/// A named gene set. Genes are de-duplicated and keep their first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pathway {
    term: String,
    genes: Vec<String>,
}

impl Pathway {
    pub fn new<T, G, S>(term: T, genes: G) -> Result<Self, CatalogError>
    where
        T: Into<String>,
        G: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let term = term.into();
        if term.trim().is_empty() {
            return Err(CatalogError::EmptyTerm);
        }
        let mut seen = AHashSet::new();
        let mut ordered = Vec::new();
        for gene in genes {
            let gene = gene.into();
            if gene.is_empty() {
                continue;
            }
            if seen.insert(gene.clone()) {
                ordered.push(gene);
            }
        }
        if ordered.is_empty() {
            return Err(CatalogError::EmptyPathway(term));
        }
        Ok(Self {
            term,
            genes: ordered,
        })
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

/// Immutable, insertion-ordered collection of pathways with unique terms.
#[derive(Debug, Clone)]
pub struct PathwayCatalog {
    pathways: Vec<Pathway>,
    index: AHashMap<String, usize>,
}

impl PathwayCatalog {
    pub fn new<I>(pathways: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = Pathway>,
    {
        let mut ordered = Vec::new();
        let mut index = AHashMap::new();
        for pathway in pathways {
            if index.contains_key(pathway.term()) {
                return Err(CatalogError::DuplicateTerm(pathway.term().to_string()));
            }
            index.insert(pathway.term().to_string(), ordered.len());
            ordered.push(pathway);
        }
        if ordered.is_empty() {
            return Err(CatalogError::EmptyCatalog);
        }
        Ok(Self {
            pathways: ordered,
            index,
        })
    }

    /// Convenience constructor from `(term, genes)` pairs.
    pub fn from_entries<I, T, G, S>(entries: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (T, G)>,
        T: Into<String>,
        G: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pathways = entries
            .into_iter()
            .map(|(term, genes)| Pathway::new(term, genes))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(pathways)
    }

    pub fn len(&self) -> usize {
        self.pathways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pathways.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pathway> {
        self.pathways.iter()
    }

    pub fn pathways(&self) -> &[Pathway] {
        &self.pathways
    }

    pub fn get(&self, term: &str) -> Option<&Pathway> {
        self.index.get(term).map(|&i| &self.pathways[i])
    }

    /// Union of all catalog genes, in order of first appearance.
    pub fn gene_universe(&self) -> GeneUniverse {
        let mut seen = AHashSet::new();
        let mut genes = Vec::new();
        for gene in self.pathways.iter().flat_map(|p| p.genes().iter()) {
            if seen.insert(gene.as_str()) {
                genes.push(gene.clone());
            }
        }
        GeneUniverse { genes }
    }
}

/// The column space of every simulated cohort in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneUniverse {
    genes: Vec<String>,
}

impl GeneUniverse {
    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

/// Anything able to hand the engine a validated catalog.
pub trait CatalogSource {
    fn load(&self) -> Result<PathwayCatalog, CatalogError>;
}

impl CatalogSource for PathwayCatalog {
    fn load(&self) -> Result<PathwayCatalog, CatalogError> {
        Ok(self.clone())
    }
}

/// Reads `term<TAB>description<TAB>gene<TAB>gene...` records, optionally gzip-compressed.
#[derive(Debug, Clone)]
pub struct GmtCatalog {
    path: PathBuf,
}

impl GmtCatalog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn open(&self) -> Result<Box<dyn BufRead>, CatalogError> {
        let file = File::open(&self.path).map_err(|source| CatalogError::Io {
            path: self.path.clone(),
            source,
        })?;
        let is_gzip = self
            .path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
        let reader: Box<dyn Read> = if is_gzip {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Ok(Box::new(BufReader::new(reader)))
    }
}

impl CatalogSource for GmtCatalog {
    fn load(&self) -> Result<PathwayCatalog, CatalogError> {
        let reader = self.open()?;
        let mut pathways = Vec::new();
        for (line_idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| CatalogError::Io {
                path: self.path.clone(),
                source,
            })?;
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.trim().is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut fields = trimmed.split('\t');
            let term = fields.next().unwrap_or_default().trim();
            if term.is_empty() {
                return Err(CatalogError::MalformedLine {
                    path: self.path.clone(),
                    line: line_idx + 1,
                    reason: "missing pathway term",
                });
            }
            if fields.next().is_none() {
                return Err(CatalogError::MalformedLine {
                    path: self.path.clone(),
                    line: line_idx + 1,
                    reason: "missing description column",
                });
            }
            let genes: Vec<&str> = fields.map(str::trim).filter(|g| !g.is_empty()).collect();
            if genes.is_empty() {
                return Err(CatalogError::MalformedLine {
                    path: self.path.clone(),
                    line: line_idx + 1,
                    reason: "no genes",
                });
            }
            pathways.push(Pathway::new(term, genes)?);
        }
        let catalog = PathwayCatalog::new(pathways)?;
        log::info!(
            "Loaded {} pathways covering {} genes from {}",
            catalog.len(),
            catalog.gene_universe().len(),
            self.path.display()
        );
        Ok(catalog)
    }
}
