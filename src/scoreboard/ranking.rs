//! Turning score rows into a ranked board.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::utils::format_hms;
use crate::core::{Contest, ContestStyle, ContestantInfo, Problem, ScoreProblemData};

/// Balloon colors assigned to problems in short-name order
pub const COLOR_WHEEL: [&str; 12] = [
    "#FF4136", "#85144B", "#F012BE", "#B10DC9", "#0074D9", "#7FDBFF", "#39CCCC", "#3D9970",
    "#2ECC40", "#01FF70", "#FFDC00", "#FF851B",
];

#[derive(Debug, Clone, Serialize)]
pub struct ScoreboardData {
    pub contest_id: i64,
    pub contest_name: String,
    pub style: ContestStyle,
    pub contestant_count: usize,
    pub problems: Vec<ScoreboardProblem>,
    pub contestants: Vec<ScoreboardContestant>,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreboardProblem {
    pub problem_id: i64,
    pub name: String,
    pub short_name: String,
    pub color: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreboardContestant {
    pub user_id: i64,
    pub name: String,
    pub institution: String,
    pub country: String,
    pub rank: usize,
    pub total_score: i64,
    /// Seconds; always 0 on IOI boards
    pub total_penalty: i64,
    pub penalty_str: String,
    /// One cell per problem, in column order
    pub problems: Vec<ProblemCell>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProblemCell {
    pub problem_id: i64,
    pub score: i32,
    pub submission_count: u32,
    pub accepted: bool,
    /// Seconds from the contestant's start to the accepted submission
    pub accepted_time: i64,
    pub accepted_time_str: String,
    pub penalty_time: i64,
    pub one_hit: bool,
}

/// Build a ranked board.
///
/// Rows are ranked by total score (desc), then penalty (asc), then user id.
/// ICPC penalty is every rejection penalty plus the time to each accept.
/// The contest start anchors accepted times; contests without one use each
/// contestant's entry time.
pub fn build_scoreboard(
    contest: &Contest,
    mut problems: Vec<Problem>,
    contestants: Vec<ContestantInfo>,
    rows: &[ScoreProblemData],
) -> ScoreboardData {
    problems.sort_by(|a, b| a.short_name.cmp(&b.short_name).then(a.id.cmp(&b.id)));

    let by_key: HashMap<(i64, i64), &ScoreProblemData> = rows
        .iter()
        .map(|r| ((r.user_id, r.problem_id), r))
        .collect();
    let icpc = contest.style == ContestStyle::Icpc;

    let mut board: Vec<ScoreboardContestant> = contestants
        .into_iter()
        .map(|c| {
            let start = contest
                .start_time
                .map(|t| t.timestamp())
                .unwrap_or(c.joined_at);
            let mut total_score = 0i64;
            let mut total_penalty = 0i64;

            let cells = problems
                .iter()
                .map(|p| {
                    let Some(row) = by_key.get(&(c.user_id, p.id)) else {
                        return ProblemCell {
                            problem_id: p.id,
                            ..Default::default()
                        };
                    };
                    let accepted = row.accepted_time > 0;
                    let accepted_time = if accepted {
                        (row.accepted_time - start).max(0)
                    } else {
                        0
                    };

                    total_score += row.score as i64;
                    if icpc {
                        // rejections count even on unsolved problems
                        total_penalty += row.penalty_time;
                        if accepted {
                            total_penalty += accepted_time;
                        }
                    }

                    ProblemCell {
                        problem_id: p.id,
                        score: row.score,
                        submission_count: row.submission_count,
                        accepted,
                        accepted_time,
                        accepted_time_str: if accepted {
                            format_hms(accepted_time)
                        } else {
                            String::new()
                        },
                        penalty_time: row.penalty_time,
                        one_hit: row.one_hit,
                    }
                })
                .collect();

            ScoreboardContestant {
                user_id: c.user_id,
                name: c.name,
                institution: c.institution,
                country: c.country,
                rank: 0,
                total_score,
                total_penalty,
                penalty_str: format_hms(total_penalty),
                problems: cells,
            }
        })
        .collect();

    board.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then(a.total_penalty.cmp(&b.total_penalty))
            .then(a.user_id.cmp(&b.user_id))
    });
    for (i, row) in board.iter_mut().enumerate() {
        row.rank = i + 1;
    }

    ScoreboardData {
        contest_id: contest.id,
        contest_name: contest.title.clone(),
        style: contest.style,
        contestant_count: board.len(),
        problems: problems
            .iter()
            .enumerate()
            .map(|(i, p)| ScoreboardProblem {
                problem_id: p.id,
                name: p.name.clone(),
                short_name: p.short_name.clone(),
                color: COLOR_WHEEL[i % COLOR_WHEEL.len()],
            })
            .collect(),
        contestants: board,
        computed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures;

    fn contestant(user_id: i64) -> ContestantInfo {
        ContestantInfo {
            user_id,
            name: format!("team{}", user_id),
            institution: String::new(),
            country: String::new(),
            joined_at: 5_000,
        }
    }

    fn row(user_id: i64, problem_id: i64, score: i32, accepted_time: i64, penalty: i64) -> ScoreProblemData {
        ScoreProblemData {
            contest_id: 1,
            problem_id,
            user_id,
            score,
            accepted_time,
            penalty_time: penalty,
            submission_count: 1,
            one_hit: penalty == 0 && accepted_time > 0,
            regraded: false,
        }
    }

    fn problems() -> Vec<Problem> {
        let mut b = fixtures::problem(2, Some(1));
        b.short_name = "B".into();
        let mut a = fixtures::problem(1, Some(1));
        a.short_name = "A".into();
        vec![b, a]
    }

    #[test]
    fn test_icpc_ranking_by_solved_then_penalty() {
        let contest = fixtures::contest(1, ContestStyle::Icpc);
        // contest starts at t=1000
        let rows = vec![
            row(1, 1, 1, 1_600, 0),
            row(2, 1, 1, 1_300, 1_200),
            row(3, 1, 1, 1_100, 0),
            row(3, 2, 1, 1_200, 0),
        ];
        let board = build_scoreboard(
            &contest,
            problems(),
            vec![contestant(1), contestant(2), contestant(3), contestant(4)],
            &rows,
        );

        let order: Vec<_> = board
            .contestants
            .iter()
            .map(|c| (c.user_id, c.rank, c.total_score, c.total_penalty))
            .collect();
        assert_eq!(
            order,
            vec![(3, 1, 2, 300), (1, 2, 1, 600), (2, 3, 1, 1_500), (4, 4, 0, 0)]
        );
        assert_eq!(board.contestants[0].penalty_str, "0:05:00");
        assert_eq!(board.contestant_count, 4);
    }

    #[test]
    fn test_icpc_rejections_on_unsolved_problem_count() {
        let contest = fixtures::contest(1, ContestStyle::Icpc);
        let rows = vec![
            row(1, 1, 1, 1_300, 0),
            row(1, 2, 0, 0, 3 * 1_200),
            row(2, 1, 1, 1_400, 0),
        ];
        let board = build_scoreboard(
            &contest,
            problems(),
            vec![contestant(1), contestant(2)],
            &rows,
        );
        let order: Vec<_> = board
            .contestants
            .iter()
            .map(|c| (c.user_id, c.total_penalty))
            .collect();
        assert_eq!(order, vec![(2, 400), (1, 3_900)]);
    }

    #[test]
    fn test_problem_columns_and_colors() {
        let contest = fixtures::contest(1, ContestStyle::Icpc);
        let board = build_scoreboard(&contest, problems(), vec![contestant(1)], &[]);
        let columns: Vec<_> = board
            .problems
            .iter()
            .map(|p| (p.short_name.as_str(), p.color))
            .collect();
        assert_eq!(columns, vec![("A", "#FF4136"), ("B", "#85144B")]);
        assert_eq!(board.contestants[0].problems.len(), 2);
        assert!(!board.contestants[0].problems[0].accepted);
    }

    #[test]
    fn test_colors_wrap_around() {
        let contest = fixtures::contest(1, ContestStyle::Icpc);
        let problems: Vec<_> = (1..=13)
            .map(|i| {
                let mut p = fixtures::problem(i, Some(1));
                p.short_name = format!("{:02}", i);
                p
            })
            .collect();
        let board = build_scoreboard(&contest, problems, vec![], &[]);
        assert_eq!(board.problems[12].color, board.problems[0].color);
    }

    #[test]
    fn test_ioi_sums_scores_without_penalty() {
        let contest = fixtures::contest(1, ContestStyle::Ioi);
        let rows = vec![
            row(1, 1, 40, 0, 1_200),
            row(1, 2, 100, 2_000, 0),
            row(2, 1, 100, 1_500, 0),
            row(2, 2, 70, 0, 0),
        ];
        let board = build_scoreboard(&contest, problems(), vec![contestant(1), contestant(2)], &rows);
        assert_eq!(board.contestants[0].user_id, 2);
        assert_eq!(board.contestants[0].total_score, 170);
        assert_eq!(board.contestants[1].total_score, 140);
        assert!(board.contestants.iter().all(|c| c.total_penalty == 0));
    }

    #[test]
    fn test_ties_break_by_user_id() {
        let contest = fixtures::contest(1, ContestStyle::Icpc);
        let board = build_scoreboard(
            &contest,
            problems(),
            vec![contestant(9), contestant(3)],
            &[],
        );
        assert_eq!(board.contestants[0].user_id, 3);
        assert_eq!(board.contestants[1].rank, 2);
    }

    #[test]
    fn test_missing_start_uses_join_time() {
        let mut contest = fixtures::contest(1, ContestStyle::Icpc);
        contest.start_time = None;
        let rows = vec![row(1, 1, 1, 5_090, 0)];
        let board = build_scoreboard(&contest, problems(), vec![contestant(1)], &rows);
        let cell = &board.contestants[0].problems[0];
        assert_eq!(cell.accepted_time, 90);
        assert_eq!(cell.accepted_time_str, "0:01:30");
    }
}
