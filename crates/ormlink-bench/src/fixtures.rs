//! Entities and data sizes shared by the benchmarks.

use ormlink_core::entity::{ClassDescriptor, Entity};
use ormlink_core::meta::RelationSchema;
use ormlink_query::SqlType;

/// Scale factor for benchmark data.
#[derive(Clone, Copy, Debug, Default)]
pub enum Scale {
    /// 10 posts per author.
    Tiny,
    /// 100 posts per author.
    #[default]
    Small,
    /// 1,000 posts per author.
    Medium,
}

impl Scale {
    /// Number of targets on the collection side.
    pub fn count(&self) -> usize {
        match self {
            Scale::Tiny => 10,
            Scale::Small => 100,
            Scale::Medium => 1_000,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scale::Tiny => "tiny",
            Scale::Small => "small",
            Scale::Medium => "medium",
        }
    }
}

#[derive(Debug, Default)]
pub struct Author {
    pub name: String,
    pub post_count: i64,
}

impl Entity for Author {
    fn descriptor() -> ClassDescriptor<Self> {
        ClassDescriptor::<Self>::new("Author")
            .field(
                "name",
                SqlType::Text,
                |a| a.name.clone().into(),
                |a, v| {
                    a.name = v.try_into()?;
                    Ok(())
                },
            )
            .transient_field(
                "post_count",
                SqlType::Int64,
                |a| a.post_count.into(),
                |a, v| {
                    a.post_count = v.try_into()?;
                    Ok(())
                },
            )
            .relation(RelationSchema::collection("posts", "Post").strong())
            .depends_on("post_count", "posts", "title")
            .recompute_with(|a, _, sources| a.post_count = sources.len() as i64)
    }
}

#[derive(Debug, Default)]
pub struct Post {
    pub title: String,
    pub views: i64,
}

impl Entity for Post {
    fn descriptor() -> ClassDescriptor<Self> {
        ClassDescriptor::<Self>::new("Post")
            .field(
                "title",
                SqlType::Text,
                |p| p.title.clone().into(),
                |p, v| {
                    p.title = v.try_into()?;
                    Ok(())
                },
            )
            .field(
                "views",
                SqlType::Int64,
                |p| p.views.into(),
                |p, v| {
                    p.views = v.try_into()?;
                    Ok(())
                },
            )
            .relation(RelationSchema::single("author", "Author"))
    }
}

/// An author value with a deterministic name.
pub fn author(index: usize) -> Author {
    Author {
        name: format!("author_{index}"),
        post_count: 0,
    }
}

/// A post value with a deterministic title.
pub fn post(index: usize) -> Post {
    Post {
        title: format!("post_{index}"),
        views: (index % 97) as i64,
    }
}
