use crate::model::{FieldRecord, NodeModel};

/// Read-only view over one node of the canonical node table.
///
/// The owning [`WorkflowState`](super::WorkflowState) holds the node data;
/// views expose no setters, so every mutation goes through the state's
/// write-through methods and serialization always reflects live edits.
#[derive(Clone, Copy)]
pub struct Node<'a> {
    inner: &'a NodeModel,
}

impl<'a> Node<'a> {
    pub(crate) fn new(inner: &'a NodeModel) -> Self {
        Self {
            inner,
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn node_type(&self) -> &str {
        &self.inner.node_type
    }

    pub fn category(&self) -> &str {
        &self.inner.category
    }

    pub fn task_name(&self) -> &str {
        &self.inner.data.task_name
    }

    pub fn status(&self) -> u16 {
        self.inner.data.status
    }

    pub fn run_time(&self) -> f64 {
        self.inner.data.run_time
    }

    pub fn get_field(
        &self,
        field: &str,
    ) -> Option<&'a FieldRecord> {
        self.inner.data.template.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &'a str> {
        self.inner.data.template.keys().map(|k| k.as_str())
    }

    pub fn data(&self) -> &'a NodeModel {
        self.inner
    }
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "<Node {} @{}>", self.inner.node_type, self.inner.id)
    }
}
