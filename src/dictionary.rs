use std::collections::HashMap;

/// A bidirectional dictionary for mapping between strings and dense ids
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    /// Map from string to ID
    str_to_id: HashMap<String, u32>,
    /// Map from ID to string
    id_to_str: Vec<String>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.id_to_str.len()
    }

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

    pub fn get(&self, s: &str) -> Option<u32> {
        self.str_to_id.get(s).copied()
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.id_to_str.get(id as usize).map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.str_to_id.clear();
        self.id_to_str.clear();
    }
}
