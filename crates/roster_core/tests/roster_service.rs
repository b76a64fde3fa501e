use roster_core::{
    open_db_in_memory, Member, MemberId, MemberRepository, RepoError, RosterService, Session,
    SqliteMemberRepository, SqliteTeamRepository, Team, TeamId, TeamRepository,
};

#[test]
fn enroll_with_and_without_team() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let service = RosterService::new(
        SqliteMemberRepository::try_new(&session).unwrap(),
        SqliteTeamRepository::try_new(&session).unwrap(),
    );
    let mut team = Team::new("teamA");
    let team_id = service.teams().save(&mut team).unwrap();

    let placed = service.enroll("member1", 10, Some(team_id)).unwrap();
    let solo = service.enroll("member2", 20, None).unwrap();

    assert_eq!(placed.team_id(), Some(team_id));
    assert!(placed.id().is_some());
    assert_eq!(solo.team_id(), None);
    assert_eq!(service.members().count().unwrap(), 2);

    let err = service.enroll("member3", 30, Some(TeamId(404))).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { entity: "team", .. }));
}

#[test]
fn transfer_moves_member_to_other_team() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let service = RosterService::new(
        SqliteMemberRepository::try_new(&session).unwrap(),
        SqliteTeamRepository::try_new(&session).unwrap(),
    );
    let team_a = service.teams().save(&mut Team::new("teamA")).unwrap();
    let team_b = service.teams().save(&mut Team::new("teamB")).unwrap();
    let member = service.enroll("member1", 10, Some(team_a)).unwrap();
    let member_id = member.id().unwrap();

    let moved = service.transfer(member_id, team_b).unwrap();

    assert_eq!(moved.team_id(), Some(team_b));
    assert_eq!(moved.version(), 1);
    let team = service.teams().find_by_id(team_b).unwrap().unwrap();
    assert!(team.contains_member(moved.key()));

    let err = service.transfer(MemberId(404), team_b).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { entity: "member", .. }));
}

#[test]
fn disband_team_releases_members_then_deletes() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let service = RosterService::new(
        SqliteMemberRepository::try_new(&session).unwrap(),
        SqliteTeamRepository::try_new(&session).unwrap(),
    );
    let team_id = service.teams().save(&mut Team::new("teamA")).unwrap();
    service.enroll("member1", 10, Some(team_id)).unwrap();
    service.enroll("member2", 20, Some(team_id)).unwrap();

    let released = service.disband_team(team_id).unwrap();

    assert_eq!(released, 2);
    assert!(service.teams().find_by_id(team_id).unwrap().is_none());
    let remaining = service.members().find_all().unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|member| member.team_id().is_none()));
}

#[test]
fn age_up_from_refreshes_held_instances() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let service = RosterService::new(
        SqliteMemberRepository::try_new(&session).unwrap(),
        SqliteTeamRepository::try_new(&session).unwrap(),
    );
    let mut held = vec![
        service.enroll("member1", 18, None).unwrap(),
        service.enroll("member2", 20, None).unwrap(),
        service.enroll("member3", 25, None).unwrap(),
        Member::with_age("draft", 50),
    ];

    let affected = service.age_up_from(20, &mut held).unwrap();

    assert_eq!(affected, 2);
    let ages: Vec<u32> = held.iter().map(|member| member.age).collect();
    assert_eq!(ages, vec![18, 21, 26, 50]);
    assert!(held.iter().all(|member| !session.is_stale(member)));

    held[1].username = "renamed".to_string();
    service.members().save(&mut held[1]).unwrap();
}
