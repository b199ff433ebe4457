/// Type definitions for the simulator debugger session
///
/// Model types built from debugger output: object listings, step status
/// snapshots, scheduler context, globals, and printed object properties.
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Overall state of the debugger session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GldStatus {
    /// No simulation loaded, or the process has exited
    None,
    /// A command is executing and the simulator owns the console
    Running,
    /// The simulator is waiting at the debugger prompt
    Stopped,
}

impl fmt::Display for GldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GldStatus::None => write!(f, "none"),
            GldStatus::Running => write!(f, "running"),
            GldStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Service state column of an object listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    None,
    Active,
    Planned,
    Retired,
}

impl ServiceStatus {
    pub fn from_code(code: char) -> ServiceStatus {
        match code {
            'A' => ServiceStatus::Active,
            'P' => ServiceStatus::Planned,
            'R' => ServiceStatus::Retired,
            _ => ServiceStatus::None,
        }
    }

    pub fn code(&self) -> char {
        match self {
            ServiceStatus::None => '-',
            ServiceStatus::Active => 'A',
            ServiceStatus::Planned => 'P',
            ServiceStatus::Retired => 'R',
        }
    }
}

/// Pass synchronization column of an object listing
///
/// The simulator renders one letter per pass; upper case means the pass
/// has completed, lower case means it is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    None,
    Pre,
    Post,
}

impl SyncStatus {
    pub fn from_code(code: char) -> SyncStatus {
        if code.is_uppercase() {
            SyncStatus::Post
        } else if code.is_lowercase() {
            SyncStatus::Pre
        } else {
            SyncStatus::None
        }
    }

    pub fn code(&self) -> char {
        match self {
            SyncStatus::None => '-',
            SyncStatus::Pre => 't',
            SyncStatus::Post => 'T',
        }
    }
}

/// One simulation object from a `list` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GldObject {
    pub name: String,
    /// Name of the parent object; empty for top-level objects
    pub parent_name: String,
    pub rank: i32,
    pub clock: String,
    pub service: ServiceStatus,
    pub presync: SyncStatus,
    pub sync: SyncStatus,
    pub postsync: SyncStatus,
    pub locked: bool,
    pub has_plc: bool,
}

impl GldObject {
    /// Name of the implicit node every parentless object hangs from
    pub const ROOT_NAME: &'static str = "ROOT";

    pub fn new(name: impl Into<String>) -> GldObject {
        GldObject {
            name: name.into(),
            parent_name: String::new(),
            rank: 0,
            clock: String::new(),
            service: ServiceStatus::None,
            presync: SyncStatus::None,
            sync: SyncStatus::None,
            postsync: SyncStatus::None,
            locked: false,
            has_plc: false,
        }
    }

    /// Six-character flags column as the simulator renders it
    pub fn status_string(&self) -> String {
        let mut out = String::with_capacity(6);
        out.push(self.service.code());
        out.push(self.presync.code());
        out.push(self.sync.code());
        out.push(self.postsync.code());
        out.push(if self.locked { '1' } else { '-' });
        out.push(if self.has_plc { 'x' } else { '-' });
        out
    }
}

impl fmt::Display for GldObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.status_string())
    }
}

/// Snapshot of the simulator's position after a step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepStatus {
    pub global_clock: String,
    pub pass: String,
    pub rank: i32,
    pub object_name: String,
    pub iteration: i32,
    /// Whether the stepped-for dimension changed during the run
    pub update_focus: bool,
}

/// Scheduler context reported by the `where` command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationStatus {
    pub global_clock: String,
    pub hard_events: i32,
    pub sync_status: String,
    pub step_to_time: String,
    pub pass: String,
    pub rank: i32,
    pub object: String,
}

/// One global variable from a `globals` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalEntry {
    pub name: String,
    pub value: String,
}

/// Globals listing in the order the simulator printed them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalList {
    pub entries: Vec<GlobalEntry>,
}

impl GlobalList {
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push(GlobalEntry {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.value.as_str())
    }
}

/// One property from a `print` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyEntry {
    pub name: String,
    pub value: String,
    pub property_type: Option<String>,
}

/// Properties of a single object in printed order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectProperties {
    pub object_name: String,
    pub entries: Vec<PropertyEntry>,
}

impl ObjectProperties {
    pub fn add(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        property_type: Option<&str>,
    ) {
        self.entries.push(PropertyEntry {
            name: name.into(),
            value: value.into(),
            property_type: property_type.map(str::to_string),
        });
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.value.as_str())
    }
}

/// Parent/child tree assembled from a flat object listing
///
/// Each object names its parent; the listing is grouped by parent name
/// and attached recursively starting from the implicit ROOT node.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectTree {
    pub name: String,
    /// None only on the synthetic root node
    pub object: Option<GldObject>,
    pub children: Vec<ObjectTree>,
}

impl ObjectTree {
    pub fn build(objects: &[GldObject]) -> ObjectTree {
        let mut by_parent: HashMap<&str, Vec<&GldObject>> = HashMap::new();
        for obj in objects {
            by_parent.entry(obj.parent_name.as_str()).or_default().push(obj);
        }
        ObjectTree::attach(GldObject::ROOT_NAME, None, &by_parent)
    }

    fn attach(
        name: &str,
        object: Option<&GldObject>,
        by_parent: &HashMap<&str, Vec<&GldObject>>,
    ) -> ObjectTree {
        let children = by_parent
            .get(name)
            .map(|kids| {
                kids.iter()
                    .map(|kid| ObjectTree::attach(&kid.name, Some(*kid), by_parent))
                    .collect()
            })
            .unwrap_or_default();
        ObjectTree {
            name: name.to_string(),
            object: object.cloned(),
            children,
        }
    }

    /// Swap in a fresh copy of the named object after an update refresh
    pub fn replace_object(&mut self, object: &GldObject) -> bool {
        if self.name == object.name {
            self.object = Some(object.clone());
            return true;
        }
        for child in &mut self.children {
            if child.replace_object(object) {
                return true;
            }
        }
        false
    }

    pub fn find(&self, name: &str) -> Option<&ObjectTree> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_status_codes() {
        assert_eq!(SyncStatus::from_code('T'), SyncStatus::Post);
        assert_eq!(SyncStatus::from_code('B'), SyncStatus::Post);
        assert_eq!(SyncStatus::from_code('t'), SyncStatus::Pre);
        assert_eq!(SyncStatus::from_code('b'), SyncStatus::Pre);
        assert_eq!(SyncStatus::from_code('-'), SyncStatus::None);

        assert_eq!(SyncStatus::Post.code(), 'T');
        assert_eq!(SyncStatus::Pre.code(), 't');
        assert_eq!(SyncStatus::None.code(), '-');
    }

    #[test]
    fn test_service_status_codes() {
        assert_eq!(ServiceStatus::from_code('A'), ServiceStatus::Active);
        assert_eq!(ServiceStatus::from_code('P'), ServiceStatus::Planned);
        assert_eq!(ServiceStatus::from_code('R'), ServiceStatus::Retired);
        assert_eq!(ServiceStatus::from_code('-'), ServiceStatus::None);
        assert_eq!(ServiceStatus::from_code('z'), ServiceStatus::None);
    }

    #[test]
    fn test_status_string_rendering() {
        let mut obj = GldObject::new("house:1");
        obj.service = ServiceStatus::Active;
        obj.presync = SyncStatus::Post;
        obj.sync = SyncStatus::Pre;
        assert_eq!(obj.status_string(), "ATt---");

        obj.locked = true;
        obj.has_plc = true;
        obj.postsync = SyncStatus::Post;
        assert_eq!(obj.status_string(), "ATtT1x");
    }

    #[test]
    fn test_object_display() {
        let mut obj = GldObject::new("node:4");
        obj.service = ServiceStatus::Planned;
        assert_eq!(obj.to_string(), "node:4 P-----");
    }

    #[test]
    fn test_tree_builds_from_parent_names() {
        let mut node = GldObject::new("Node1");
        node.parent_name = GldObject::ROOT_NAME.to_string();
        let mut house1 = GldObject::new("house:1");
        house1.parent_name = "Node1".to_string();
        let mut house2 = GldObject::new("house:2");
        house2.parent_name = "Node1".to_string();

        let tree = ObjectTree::build(&[node, house1, house2]);
        assert_eq!(tree.name, GldObject::ROOT_NAME);
        assert!(tree.object.is_none());
        assert_eq!(tree.children.len(), 1);

        let node = &tree.children[0];
        assert_eq!(node.name, "Node1");
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.children[0].name, "house:1");
        assert_eq!(node.children[1].name, "house:2");
    }

    #[test]
    fn test_tree_replace_object() {
        let mut node = GldObject::new("Node1");
        node.parent_name = GldObject::ROOT_NAME.to_string();
        let mut house = GldObject::new("house:1");
        house.parent_name = "Node1".to_string();

        let mut tree = ObjectTree::build(&[node, house.clone()]);
        house.locked = true;
        assert!(tree.replace_object(&house));

        let found = tree.find("house:1").unwrap();
        assert!(found.object.as_ref().unwrap().locked);
        assert!(!tree.replace_object(&GldObject::new("missing")));
    }

    #[test]
    fn test_tree_skips_unreachable_objects() {
        let mut orphan = GldObject::new("meter:9");
        orphan.parent_name = "nonexistent".to_string();
        let tree = ObjectTree::build(&[orphan]);
        assert!(tree.children.is_empty());
        assert!(tree.find("meter:9").is_none());
    }
}
