//! Negotiation payload: a description followed by trickled-in candidates

use crate::engine::{IceCandidate, SdpKind, SessionDescription};
use serde::{Deserialize, Deserializer, Serialize};

/// One element of a negotiation payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NegotiationItem {
    Offer { sdp: String },
    Answer { sdp: String },
    Candidate { candidate: IceCandidate },
}

impl From<SessionDescription> for NegotiationItem {
    fn from(description: SessionDescription) -> Self {
        match description.kind {
            SdpKind::Offer => NegotiationItem::Offer {
                sdp: description.sdp,
            },
            SdpKind::Answer => NegotiationItem::Answer {
                sdp: description.sdp,
            },
        }
    }
}

impl From<IceCandidate> for NegotiationItem {
    fn from(candidate: IceCandidate) -> Self {
        NegotiationItem::Candidate { candidate }
    }
}

impl NegotiationItem {
    /// The session description carried by this item, if any
    pub fn description(&self) -> Option<SessionDescription> {
        match self {
            NegotiationItem::Offer { sdp } => Some(SessionDescription::offer(sdp.clone())),
            NegotiationItem::Answer { sdp } => Some(SessionDescription::answer(sdp.clone())),
            NegotiationItem::Candidate { .. } => None,
        }
    }
}

/// Ordered list of negotiation items
///
/// Serializes as a JSON array. A single item object is also accepted on
/// input and treated as a one-element list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NegotiationPayload(Vec<NegotiationItem>);

impl NegotiationPayload {
    pub fn new(items: Vec<NegotiationItem>) -> Self {
        Self(items)
    }

    /// A description followed by the candidates gathered for it
    pub fn with_candidates(description: SessionDescription, candidates: Vec<IceCandidate>) -> Self {
        let mut items = Vec::with_capacity(candidates.len() + 1);
        items.push(NegotiationItem::from(description));
        items.extend(candidates.into_iter().map(NegotiationItem::from));
        Self(items)
    }

    pub fn items(&self) -> &[NegotiationItem] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NegotiationItem> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First session description in the payload
    pub fn description(&self) -> Option<SessionDescription> {
        self.0.iter().find_map(NegotiationItem::description)
    }

    pub fn candidates(&self) -> impl Iterator<Item = &IceCandidate> {
        self.0.iter().filter_map(|item| match item {
            NegotiationItem::Candidate { candidate } => Some(candidate),
            _ => None,
        })
    }
}

impl<'a> IntoIterator for &'a NegotiationPayload {
    type Item = &'a NegotiationItem;
    type IntoIter = std::slice::Iter<'a, NegotiationItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<'de> Deserialize<'de> for NegotiationPayload {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            Many(Vec<NegotiationItem>),
            One(NegotiationItem),
        }

        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::Many(items) => NegotiationPayload(items),
            OneOrMany::One(item) => NegotiationPayload(vec![item]),
        })
    }
}
