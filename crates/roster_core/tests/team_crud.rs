use roster_core::{
    open_db_in_memory, Member, MemberRepository, RepoError, Session, SqliteMemberRepository,
    SqliteTeamRepository, Team, TeamRepository,
};

#[test]
fn save_find_and_rename_team() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let teams = SqliteTeamRepository::try_new(&session).unwrap();

    let mut team = Team::new("teamA");
    let id = teams.save(&mut team).unwrap();
    assert_eq!(team.id(), Some(id));

    team.name = "teamAlpha".to_string();
    teams.save(&mut team).unwrap();

    let loaded = teams.find_by_id(id).unwrap().unwrap();
    assert_eq!(loaded.name, "teamAlpha");
    assert_eq!(loaded.key(), team.key());
    assert!(loaded.members().is_empty());
}

#[test]
fn blank_team_name_is_rejected() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let teams = SqliteTeamRepository::try_new(&session).unwrap();

    let err = teams.save(&mut Team::new("  ")).unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
    assert!(teams.find_all().unwrap().is_empty());
}

#[test]
fn loaded_team_lists_its_members() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let teams = SqliteTeamRepository::try_new(&session).unwrap();
    let members = SqliteMemberRepository::try_new(&session).unwrap();

    let mut team_a = Team::new("teamA");
    let mut team_b = Team::new("teamB");
    teams.save(&mut team_a).unwrap();
    teams.save(&mut team_b).unwrap();
    let mut first = Member::with_team("member1", 10, &mut team_a);
    let mut second = Member::with_team("member2", 20, &mut team_a);
    members.save(&mut first).unwrap();
    members.save(&mut second).unwrap();

    let loaded = teams.find_by_id(team_a.id().unwrap()).unwrap().unwrap();
    assert_eq!(loaded.members(), &[first.key(), second.key()]);

    let all = teams.find_all().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].members().len(), 2);
    assert!(all[1].members().is_empty());
}

#[test]
fn deleting_team_with_members_is_rejected_until_cleared() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let teams = SqliteTeamRepository::try_new(&session).unwrap();
    let members = SqliteMemberRepository::try_new(&session).unwrap();

    let mut team = Team::new("teamA");
    teams.save(&mut team).unwrap();
    let mut member = Member::with_team("member1", 10, &mut team);
    members.save(&mut member).unwrap();

    let err = teams.delete(&team).unwrap_err();
    assert!(matches!(err, RepoError::ConstraintViolation(_)));
    assert!(teams.find_by_id(team.id().unwrap()).unwrap().is_some());

    member.leave_team(&mut team);
    members.save(&mut member).unwrap();
    teams.delete(&team).unwrap();

    assert!(teams.find_by_id(team.id().unwrap()).unwrap().is_none());
    let survivor = members.find_member_by_username("member1").unwrap();
    assert_eq!(survivor.team_id(), None);
}

#[test]
fn deleting_unknown_team_is_not_found() {
    let mut conn = open_db_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();
    let teams = SqliteTeamRepository::try_new(&session).unwrap();

    let err = teams.delete(&Team::new("never saved")).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { entity: "team", .. }));
    let err = teams.delete_by_id(roster_core::TeamId(404)).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { entity: "team", .. }));
}
