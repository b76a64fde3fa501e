use roster_core::{
    open_db_in_memory, Member, MemberRepository, RepoError, Session, SqliteMemberRepository,
};

#[test]
fn bulk_age_plus_updates_only_members_at_or_above_threshold() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let members = SqliteMemberRepository::try_new(&session).unwrap();
    for (name, age) in [("member1", 18), ("member2", 20), ("member3", 25)] {
        members.save(&mut Member::with_age(name, age)).unwrap();
    }

    let affected = members.bulk_age_plus(20).unwrap();

    assert_eq!(affected, 2);
    let mut ages: Vec<u32> = members
        .find_all()
        .unwrap()
        .into_iter()
        .map(|member| member.age)
        .collect();
    ages.sort_unstable();
    assert_eq!(ages, vec![18, 21, 26]);
}

#[test]
fn bulk_update_leaves_version_untouched() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let members = SqliteMemberRepository::try_new(&session).unwrap();
    let mut member = Member::with_age("member1", 30);
    let id = members.save(&mut member).unwrap();

    members.bulk_age_plus(0).unwrap();

    let reloaded = members.find_by_id(id).unwrap().unwrap();
    assert_eq!(reloaded.age, 31);
    assert_eq!(reloaded.version(), 0);
}

#[test]
fn held_instances_are_stale_after_bulk_update_until_refreshed() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let members = SqliteMemberRepository::try_new(&session).unwrap();
    let mut member = Member::with_age("member1", 40);
    members.save(&mut member).unwrap();

    members.bulk_age_plus(20).unwrap();

    // The held copy still shows the pre-update age.
    assert_eq!(member.age, 40);
    assert!(session.is_stale(&member));
    let err = members.save(&mut member).unwrap_err();
    assert!(matches!(err, RepoError::StaleEntity(key) if key == member.key()));

    members.refresh(&mut member).unwrap();
    assert_eq!(member.age, 41);
    assert!(!session.is_stale(&member));

    member.username = "renamed".to_string();
    members.save(&mut member).unwrap();
    assert_eq!(
        members.find_member_by_username("renamed").unwrap().age,
        41
    );
}

#[test]
fn bulk_update_overflowing_age_is_a_constraint_violation() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let members = SqliteMemberRepository::try_new(&session).unwrap();
    members
        .save(&mut Member::with_age("ancient", u32::MAX))
        .unwrap();
    members.save(&mut Member::with_age("young", 5)).unwrap();

    let err = members.bulk_age_plus(10).unwrap_err();

    assert!(matches!(err, RepoError::ConstraintViolation(_)));
    // The statement is atomic: nothing moved.
    assert_eq!(
        members.find_member_by_username("ancient").unwrap().age,
        u32::MAX
    );
}

#[test]
fn bulk_update_with_no_matches_affects_nothing() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let members = SqliteMemberRepository::try_new(&session).unwrap();
    members.save(&mut Member::with_age("member1", 5)).unwrap();

    assert_eq!(members.bulk_age_plus(100).unwrap(), 0);
}
