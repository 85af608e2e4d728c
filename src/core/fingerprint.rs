use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Fixed-length bit vector summarizing an image's visual content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<bool>);

impl Fingerprint {
    pub fn new(bits: Vec<bool>) -> Self {
        Self(bits)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bits(&self) -> &[bool] {
        &self.0
    }

    pub fn into_bits(self) -> Vec<bool> {
        self.0
    }

    /// Packs the bits into 64-bit words, first bit in the lowest position.
    pub fn to_words(&self) -> Vec<u64> {
        self.0
            .chunks(64)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u64, |word, (i, &bit)| word | ((bit as u64) << i))
            })
            .collect()
    }
}

impl From<Vec<bool>> for Fingerprint {
    fn from(bits: Vec<bool>) -> Self {
        Self(bits)
    }
}

/// Path -> fingerprint mapping that keeps insertion order.
///
/// Clustering walks entries in this order, so two maps holding the same
/// entries in a different order may report different duplicate sets.
/// Equality ignores order.
#[derive(Debug, Clone, Default)]
pub struct FingerprintMap {
    entries: Vec<(PathBuf, Fingerprint)>,
    index: HashMap<PathBuf, usize>,
}

impl FingerprintMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the fingerprint for `path`. A replaced entry
    /// keeps its original position.
    pub fn insert(&mut self, path: PathBuf, fingerprint: Fingerprint) -> Option<Fingerprint> {
        match self.index.get(&path) {
            Some(&slot) => Some(std::mem::replace(&mut self.entries[slot].1, fingerprint)),
            None => {
                self.index.insert(path.clone(), self.entries.len());
                self.entries.push((path, fingerprint));
                None
            }
        }
    }

    pub fn get(&self, path: &Path) -> Option<&Fingerprint> {
        self.index.get(path).map(|&slot| &self.entries[slot].1)
    }

    pub fn contains_key(&self, path: &Path) -> bool {
        self.index.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Fingerprint)> {
        self.entries.iter().map(|(p, f)| (p.as_path(), f))
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|(p, _)| p.as_path())
    }
}

impl PartialEq for FingerprintMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(path, fp)| other.get(path).is_some_and(|theirs| theirs == fp))
    }
}

impl Eq for FingerprintMap {}

impl FromIterator<(PathBuf, Fingerprint)> for FingerprintMap {
    fn from_iter<I: IntoIterator<Item = (PathBuf, Fingerprint)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (path, fp) in iter {
            map.insert(path, fp);
        }
        map
    }
}

impl IntoIterator for FingerprintMap {
    type Item = (PathBuf, Fingerprint);
    type IntoIter = std::vec::IntoIter<(PathBuf, Fingerprint)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_pack_low_bit_first() {
        let mut bits = vec![false; 70];
        bits[0] = true;
        bits[63] = true;
        bits[64] = true;
        let words = Fingerprint::new(bits).to_words();

        assert_eq!(words.len(), 2);
        assert_eq!(words[0], 1 | (1 << 63));
        assert_eq!(words[1], 1);
    }

    #[test]
    fn test_map_keeps_insertion_order_on_replace() {
        let mut map = FingerprintMap::new();
        map.insert(PathBuf::from("b.png"), Fingerprint::new(vec![true]));
        map.insert(PathBuf::from("a.png"), Fingerprint::new(vec![false]));
        let old = map.insert(PathBuf::from("b.png"), Fingerprint::new(vec![false]));

        assert_eq!(old, Some(Fingerprint::new(vec![true])));
        assert_eq!(map.len(), 2);
        let order: Vec<_> = map.paths().map(Path::to_path_buf).collect();
        assert_eq!(order, vec![PathBuf::from("b.png"), PathBuf::from("a.png")]);
    }

    #[test]
    fn test_map_equality_ignores_order() {
        let first: FingerprintMap = vec![
            (PathBuf::from("a"), Fingerprint::new(vec![true, false])),
            (PathBuf::from("b"), Fingerprint::new(vec![false, false])),
        ]
        .into_iter()
        .collect();
        let second: FingerprintMap = vec![
            (PathBuf::from("b"), Fingerprint::new(vec![false, false])),
            (PathBuf::from("a"), Fingerprint::new(vec![true, false])),
        ]
        .into_iter()
        .collect();

        assert_eq!(first, second);
    }
}
