//! [`SkillRegistry`] – the planner's catalogue of skill descriptors.

use std::collections::BTreeMap;

use tracing::debug;
use verity_types::Skill;

/// Skills indexed by id.  Registering an id twice replaces the earlier
/// descriptor.
#[derive(Debug, Clone, Default)]
pub struct SkillRegistry {
    skills: BTreeMap<String, Skill>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the descriptor previously registered under the same id.
    pub fn register(&mut self, skill: Skill) -> Option<Skill> {
        debug!(skill = %skill.id, "skill registered");
        self.skills.insert(skill.id.clone(), skill)
    }

    pub fn get(&self, id: &str) -> Option<&Skill> {
        self.skills.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.skills.contains_key(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Skill> {
        self.skills.remove(id)
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Skills in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Skill> {
        self.skills.values()
    }

    /// Resolve `ids` in order, skipping unknown ones.
    pub fn resolve<'a>(&'a self, ids: &'a [String]) -> impl Iterator<Item = &'a Skill> + 'a {
        ids.iter().filter_map(|id| self.get(id))
    }
}

impl FromIterator<Skill> for SkillRegistry {
    fn from_iter<I: IntoIterator<Item = Skill>>(iter: I) -> Self {
        let mut registry = Self::new();
        for skill in iter {
            registry.register(skill);
        }
        registry
    }
}

impl Extend<Skill> for SkillRegistry {
    fn extend<I: IntoIterator<Item = Skill>>(&mut self, iter: I) {
        for skill in iter {
            self.register(skill);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_replaces_same_id() {
        let mut registry = SkillRegistry::new();
        assert!(registry.register(Skill::new("open")).is_none());
        let previous = registry.register(Skill::new("open").achieves("door_open", "true"));
        assert!(previous.is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("open").unwrap().postconditions.len(), 1);
    }

    #[test]
    fn resolve_skips_unknown_ids() {
        let registry: SkillRegistry = [Skill::new("a"), Skill::new("b")].into_iter().collect();
        let ids = vec!["b".to_string(), "ghost".to_string(), "a".to_string()];
        let resolved: Vec<_> = registry.resolve(&ids).map(|s| s.id.as_str()).collect();
        assert_eq!(resolved, ["b", "a"]);
    }
}
