use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tessera_primitives::content::ContentId;

/// A named edge to another block.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct DagLink {
    pub name: String,
    pub id: ContentId,
}

impl DagLink {
    pub fn new(name: impl Into<String>, id: ContentId) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }
}

/// A block of the advertisement graph: an opaque payload plus ordered links.
///
/// The node's identifier is the digest of its borsh encoding.
#[derive(
    Clone, Debug, Default, Eq, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct DagNode {
    pub data: Vec<u8>,
    pub links: Vec<DagLink>,
}

impl DagNode {
    #[must_use]
    pub fn leaf(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            links: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_link(mut self, name: impl Into<String>, id: ContentId) -> Self {
        self.links.push(DagLink::new(name, id));
        self
    }

    pub fn encode(&self) -> std::io::Result<Vec<u8>> {
        borsh::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> std::io::Result<Self> {
        borsh::from_slice(bytes)
    }

    pub fn id(&self) -> std::io::Result<ContentId> {
        Ok(ContentId::of(&self.encode()?))
    }
}
