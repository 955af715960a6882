//! Counterpart directory
//!
//! Answers "who can I talk to?". A patient sees the doctors that are
//! currently available; a doctor sees patients. The directory is injected
//! into the client, so a production build can back it with a lookup service.

use serde::{Deserialize, Serialize};

use crate::types::{Identity, Role, UserId};

/// Source of reachable counterpart identities
pub trait DirectoryProvider {
    /// Identities of the role opposite to `for_role`
    ///
    /// Doctors are only listed while `available`.
    fn list_counterparts(&self, for_role: Role) -> Vec<Identity>;

    /// Look up a single identity by id
    fn lookup(&self, id: &UserId) -> Option<Identity>;
}

/// Directory over a fixed list of identities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticDirectory {
    entries: Vec<Identity>,
}

impl StaticDirectory {
    pub fn new(entries: Vec<Identity>) -> Self {
        Self { entries }
    }

    /// The four doctors of the hosted client
    pub fn with_seed_doctors() -> Self {
        Self::new(seed_doctors())
    }

    pub fn insert(&mut self, identity: Identity) {
        match self.entries.iter_mut().find(|entry| entry.id == identity.id) {
            Some(existing) => *existing = identity,
            None => self.entries.push(identity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DirectoryProvider for StaticDirectory {
    fn list_counterparts(&self, for_role: Role) -> Vec<Identity> {
        let wanted = for_role.counterpart();
        self.entries
            .iter()
            .filter(|entry| entry.role == wanted)
            .filter(|entry| wanted != Role::Doctor || entry.available)
            .cloned()
            .collect()
    }

    fn lookup(&self, id: &UserId) -> Option<Identity> {
        self.entries.iter().find(|entry| &entry.id == id).cloned()
    }
}

/// Seed doctors; `doctor_3` is off duty
pub fn seed_doctors() -> Vec<Identity> {
    vec![
        Identity::doctor("doctor_1", "Dr. Sarah Smith").with_specialization("Psychiatry"),
        Identity::doctor("doctor_2", "Dr. Michael Johnson").with_specialization("Psychology"),
        Identity::doctor("doctor_3", "Dr. Priya Patel")
            .with_specialization("Clinical Psychology")
            .with_availability(false),
        Identity::doctor("doctor_4", "Dr. Carlos Martinez").with_specialization("Neuropsychology"),
    ]
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_sees_only_available_doctors() {
        let directory = StaticDirectory::new(vec![
            Identity::doctor("d1", "Dr. One"),
            Identity::doctor("d2", "Dr. Two").with_availability(false),
            Identity::patient("p9", "Someone Else"),
        ]);

        let listed = directory.list_counterparts(Role::Patient);
        let ids: Vec<&str> = listed.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(ids, vec!["d1"]);
    }

    #[test]
    fn test_doctor_sees_patients_regardless_of_availability() {
        let directory = StaticDirectory::new(vec![
            Identity::doctor("d1", "Dr. One"),
            Identity::patient("p1", "Pat").with_availability(false),
        ]);

        let listed = directory.list_counterparts(Role::Doctor);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, UserId::new("p1"));
    }

    #[test]
    fn test_seed_directory() {
        let directory = StaticDirectory::with_seed_doctors();
        assert_eq!(directory.len(), 4);
        assert_eq!(directory.list_counterparts(Role::Patient).len(), 3);
        assert!(directory.lookup(&UserId::new("doctor_3")).is_some());
        assert!(directory.list_counterparts(Role::Doctor).is_empty());
    }

    #[test]
    fn test_insert_replaces_existing_entry() {
        let mut directory = StaticDirectory::with_seed_doctors();
        directory.insert(Identity::doctor("doctor_3", "Dr. Priya Patel"));
        assert_eq!(directory.len(), 4);
        assert_eq!(directory.list_counterparts(Role::Patient).len(), 4);
    }
}
