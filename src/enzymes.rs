use crate::error::{ErrorCode, QuoteError};
use crate::sequence::DnaSequence;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A type IIS or classic restriction enzyme: recognition site on the
/// forward strand, and the overhang length its cut leaves behind.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RestrictionEnzyme {
    pub name: String,
    pub site: String,
    pub overhang: usize,
}

impl RestrictionEnzyme {
    fn new(name: &str, site: &str, overhang: usize) -> Self {
        Self {
            name: name.to_string(),
            site: site.to_string(),
            overhang,
        }
    }

    pub fn is_palindromic(&self) -> bool {
        let seq = DnaSequence::from_sequence(&self.site)
            .map(|s| s.reverse_complement().as_str().to_string());
        seq.map(|rc| rc == self.site).unwrap_or(false)
    }

    /// Recognition-site offsets on either strand, reported in forward
    /// coordinates and sorted.
    pub fn sites(&self, seq: &DnaSequence) -> Vec<usize> {
        let hay = seq.as_str();
        let mut ret: Vec<usize> = hay.match_indices(self.site.as_str()).map(|(i, _)| i).collect();
        if !self.is_palindromic() {
            let rc_site = DnaSequence::from_sequence(&self.site)
                .map(|s| s.reverse_complement().as_str().to_string())
                .unwrap_or_default();
            ret.extend(hay.match_indices(rc_site.as_str()).map(|(i, _)| i));
        }
        ret.sort_unstable();
        ret.dedup();
        ret
    }
}

/// Built-in enzyme catalog, exposed as the lazy `ENZYMES` static in lib.rs.
#[derive(Clone, Debug)]
pub struct Enzymes {
    by_name: HashMap<String, RestrictionEnzyme>,
}

impl Default for Enzymes {
    fn default() -> Self {
        let list = [
            RestrictionEnzyme::new("EcoRI", "GAATTC", 4),
            RestrictionEnzyme::new("BamHI", "GGATCC", 4),
            RestrictionEnzyme::new("BsaI", "GGTCTC", 4),
            RestrictionEnzyme::new("BsmBI", "CGTCTC", 4),
            RestrictionEnzyme::new("SapI", "GCTCTTC", 3),
            RestrictionEnzyme::new("AarI", "CACCTGC", 4),
        ];
        let by_name = list
            .into_iter()
            .map(|e| (e.name.clone(), e))
            .collect();
        Self { by_name }
    }
}

impl Enzymes {
    pub fn get(&self, name: &str) -> Result<&RestrictionEnzyme, QuoteError> {
        self.by_name.get(name).ok_or_else(|| {
            QuoteError::new(ErrorCode::NotFound, format!("unknown enzyme '{name}'"))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}
