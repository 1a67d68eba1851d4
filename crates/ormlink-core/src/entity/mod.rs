//! Entity declarations and persistent instances.
//!
//! An [`Entity`] is a plain struct plus a [`ClassDescriptor`] naming its
//! fields and relations. The context wraps every stored or new instance in a
//! [`Persistent`], which carries the key, revision, snapshot and relation
//! proxies the engine works with.

mod descriptor;
mod object;

pub use descriptor::{ClassDescriptor, Entity, FieldDescriptor, Getter, Recompute, Setter};
pub use object::{
    downcast, same_object, AsObject, ObjectCore, ObjectRef, Persistent, PersistentObject,
};
pub(crate) use object::{object_addr, Checkpoint, ClassFactory, TypedFactory};
