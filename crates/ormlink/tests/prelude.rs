use ormlink::prelude::*;

#[derive(Debug, Default)]
struct Team {
    name: String,
}

impl Entity for Team {
    fn descriptor() -> ClassDescriptor<Self> {
        ClassDescriptor::<Self>::new("Team")
            .field(
                "name",
                SqlType::Text,
                |t| t.name.clone().into(),
                |t, v| {
                    t.name = v.try_into()?;
                    Ok(())
                },
            )
            .relation(RelationSchema::collection("members", "Member"))
    }
}

#[derive(Debug, Default)]
struct Member {
    login: String,
}

impl Entity for Member {
    fn descriptor() -> ClassDescriptor<Self> {
        ClassDescriptor::<Self>::new("Member")
            .field(
                "login",
                SqlType::Text,
                |m| m.login.clone().into(),
                |m, v| {
                    m.login = v.try_into()?;
                    Ok(())
                },
            )
            .relation(RelationSchema::collection("teams", "Team"))
    }
}

fn open(path: &std::path::Path) -> StorageContext {
    let ctx = StorageContext::open(ContextConfig::file(path)).unwrap();
    ctx.register::<Team>().unwrap();
    ctx.register::<Member>().unwrap();
    ctx.create_schema().unwrap();
    ctx
}

#[test]
fn test_prelude_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("teams.db");
    let ctx = open(&path);

    let team = ctx.create(Team { name: "core".into() }).unwrap();
    let ada = ctx.create(Member { login: "ada".into() }).unwrap();
    ctx.relate(&ada, "teams", &team).unwrap();
    assert_eq!(ctx.state(&ada), SyncState::Dirty);
    assert_eq!(ctx.update(&ada).unwrap(), UpdateStatus::Success);

    let other = open(&path);
    let team2 = other.read::<Team>(team.key().unwrap()).unwrap().unwrap();
    let members = other.related::<Member>(&team2, "members").unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].read().login, "ada");

    let status = other
        .try_lock_with(&team2, serde_json::json!({"by": "ada"}))
        .unwrap();
    assert!(status.is_locked_locally());
    assert!(ctx.lock_status(&team).unwrap().is_locked_remotely());
    assert_eq!(other.unlock(&team2).unwrap(), UnlockStatus::Unlocked);
}
