use std::collections::HashMap;

/// A bidirectional dictionary for mapping between strings and integer IDs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    /// Map from string to ID
    str_to_id: HashMap<String, u32>,
    /// Map from ID to string
    id_to_str: Vec<String>,
}

impl Dictionary {
    /// Create a new empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of entries in the dictionary
    pub fn len(&self) -> usize {
        self.id_to_str.len()
    }

    /// Returns `true` if the dictionary contains no entries
    pub fn is_empty(&self) -> bool {
        self.id_to_str.is_empty()
    }

    /// Get or create an ID for a string
    pub fn get_or_insert(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.str_to_id.get(s) {
            id
        } else {
            let id = self.id_to_str.len() as u32;
            self.str_to_id.insert(s.to_string(), id);
            self.id_to_str.push(s.to_string());
            id
        }
    }

    /// Look up the ID of a string
    pub fn get_id(&self, s: &str) -> Option<u32> {
        self.str_to_id.get(s).copied()
    }

    /// Look up the string of an ID
    pub fn get_name(&self, id: u32) -> Option<&str> {
        self.id_to_str.get(id as usize).map(String::as_str)
    }

    /// All names in ID order
    pub fn names(&self) -> &[String] {
        &self.id_to_str
    }

    /// Iterate over all (string, id) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.id_to_str
            .iter()
            .enumerate()
            .map(|(id, s)| (s.as_str(), id as u32))
    }
}

impl<S: AsRef<str>> FromIterator<S> for Dictionary {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut dict = Dictionary::new();
        for s in iter {
            dict.get_or_insert(s.as_ref());
        }
        dict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dictionary_basic() {
        let mut dict = Dictionary::new();
        assert_eq!(dict.len(), 0);
        assert!(dict.is_empty());

        let id1 = dict.get_or_insert("politics");
        assert_eq!(id1, 0);
        let id2 = dict.get_or_insert("sports");
        assert_eq!(id2, 1);

        // Getting the same string should return the same ID
        assert_eq!(dict.get_or_insert("politics"), id1);
        assert_eq!(dict.len(), 2);

        assert_eq!(dict.get_id("sports"), Some(1));
        assert_eq!(dict.get_id("weather"), None);
        assert_eq!(dict.get_name(0), Some("politics"));
        assert_eq!(dict.get_name(2), None);
    }

    #[test]
    fn test_dictionary_iter() {
        let dict: Dictionary = ["the", "united", "nations", "the"].iter().collect();
        let items: Vec<_> = dict.iter().collect();
        assert_eq!(items, vec![("the", 0), ("united", 1), ("nations", 2)]);
        assert_eq!(dict.names(), &["the", "united", "nations"]);
    }
}
