//! Per-context user data registry
//!
//! Host extensions hang their own state off a context under a 4-byte tag.
//! Entries are shared (`Rc`), so a context snapshot sees the same entries as
//! the context it was taken from.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::vm::errors::{VMResult, VmError};

/// Number of user data slots per context.
pub const USER_DATA_SLOTS: usize = 4;

/// Stable 4-byte identifier of a registry entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(u32);

impl Tag {
    /// Stack/heap usage record
    pub const STACK_INFO: Tag = Tag::new(*b"Stck");
    /// Idle function installed by an extension
    pub const IDLE: Tag = Tag::new(*b"Idle");
    /// Host command line arguments
    pub const ARGS: Tag = Tag::new(*b"Args");
    /// Timer state of the time extension
    pub const TIMER: Tag = Tag::new(*b"Timr");

    #[inline]
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    #[inline]
    pub fn bytes(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for Tag {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for b in self.bytes() {
            let c = if b.is_ascii_graphic() { b as char } else { '?' };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Tag {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Tag({})", self)
    }
}

/// Tag-keyed registry of typed, shared entries.
#[derive(Clone, Default)]
pub struct UserDataRegistry {
    entries: Vec<(Tag, Rc<dyn Any>)>,
}

impl UserDataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry for `tag`, replacing any previous one.
    ///
    /// Fails with [`VmError::UserData`] when all slots hold other tags.
    pub fn set<T: Any>(
        &mut self,
        tag: Tag,
        value: Rc<T>,
    ) -> VMResult<()> {
        if let Some(slot) = self.entries.iter_mut().find(|(t, _)| *t == tag) {
            slot.1 = value;
            return Ok(());
        }
        if self.entries.len() >= USER_DATA_SLOTS {
            return Err(VmError::UserData);
        }
        self.entries.push((tag, value));
        Ok(())
    }

    /// Typed lookup. A tag holding a different type reads as absent.
    pub fn get<T: Any>(
        &self,
        tag: Tag,
    ) -> Option<Rc<T>> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .and_then(|(_, v)| Rc::clone(v).downcast::<T>().ok())
    }

    pub fn contains(
        &self,
        tag: Tag,
    ) -> bool {
        self.entries.iter().any(|(t, _)| *t == tag)
    }

    /// Remove an entry, returning whether it existed
    pub fn remove(
        &mut self,
        tag: Tag,
    ) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(t, _)| *t != tag);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.entries.iter().map(|(t, _)| *t)
    }
}

impl fmt::Debug for UserDataRegistry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_list().entries(self.tags()).finish()
    }
}
