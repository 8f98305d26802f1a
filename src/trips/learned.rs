use serde::{Deserialize, Serialize};

/// A destination whose distance was confirmed once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedDestination {
    pub name: String,
    /// Disambiguating label, e.g. a district or full address
    #[serde(default)]
    pub label: Option<String>,
    /// One-way distance in km
    pub distance_km: f64,
}

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum LearnedLookup {
    Found(LearnedDestination),
    /// Several places share the name; the caller must ask
    Ambiguous(Vec<LearnedDestination>),
    NotFound,
}

/// Candidates closer than this are the same place
const SAME_PLACE_KM: f64 = 1.0;

/// Destinations learned from resolved clarifications
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnedDestinations {
    entries: Vec<LearnedDestination>,
}

impl LearnedDestinations {
    pub const fn new(entries: Vec<LearnedDestination>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[LearnedDestination] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remember a distance. An entry with the same name and label is replaced.
    pub fn learn(&mut self, name: &str, label: Option<&str>, distance_km: f64) {
        let key = name.trim().to_lowercase();
        let label = label.map(|l| l.trim().to_string()).filter(|l| !l.is_empty());
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.name.to_lowercase() == key && e.label == label)
        {
            existing.distance_km = distance_km;
            return;
        }
        self.entries.push(LearnedDestination {
            name: name.trim().to_string(),
            label,
            distance_km,
        });
    }

    /// Exact (case-insensitive) name matches first, then partial matches in
    /// either direction. Several distinct candidates make the result ambiguous.
    pub fn lookup(&self, query: &str) -> LearnedLookup {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return LearnedLookup::NotFound;
        }

        let exact: Vec<&LearnedDestination> = self
            .entries
            .iter()
            .filter(|e| e.name.to_lowercase() == q)
            .collect();
        if !exact.is_empty() {
            return Self::classify(&exact);
        }

        if q.chars().count() < 3 {
            return LearnedLookup::NotFound;
        }
        let partial: Vec<&LearnedDestination> = self
            .entries
            .iter()
            .filter(|e| {
                let name = e.name.to_lowercase();
                name.chars().count() >= 3 && (name.contains(&q) || q.contains(&name))
            })
            .collect();
        if partial.is_empty() {
            LearnedLookup::NotFound
        } else {
            Self::classify(&partial)
        }
    }

    fn classify(candidates: &[&LearnedDestination]) -> LearnedLookup {
        let first = candidates[0];
        if candidates
            .iter()
            .all(|c| (c.distance_km - first.distance_km).abs() < SAME_PLACE_KM)
        {
            LearnedLookup::Found(first.clone())
        } else {
            LearnedLookup::Ambiguous(candidates.iter().map(|c| (*c).clone()).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_exact_partial_and_ambiguous() {
        let mut cache = LearnedDestinations::default();
        cache.learn("Tennisclub", None, 7.0);
        cache.learn("Neustadt", Some("an der Weinstraße"), 240.0);
        cache.learn("Neustadt", Some("Holstein"), 510.0);

        assert!(matches!(cache.lookup("tennisclub"), LearnedLookup::Found(d) if d.distance_km == 7.0));
        assert!(matches!(cache.lookup("Tennisclub Süd"), LearnedLookup::Found(_)));
        match cache.lookup("Neustadt") {
            LearnedLookup::Ambiguous(options) => assert_eq!(options.len(), 2),
            other => panic!("expected ambiguity, got {:?}", other),
        }
        assert_eq!(cache.lookup("Bonn"), LearnedLookup::NotFound);
    }

    #[test]
    fn learn_replaces_same_name_and_label() {
        let mut cache = LearnedDestinations::default();
        cache.learn("Oma", None, 30.0);
        cache.learn("oma", None, 32.0);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.entries()[0].distance_km, 32.0);
    }
}
