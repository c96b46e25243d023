/*!
The embargo/release-state calculator (§4.3): a total, side-effect-free
function from a file plus its upstream context to an embargo stage and
start date. Every entry point here takes `now` as an explicit argument
rather than reading the wall clock, so the whole module stays a pure
function the file manager (§4.7) can call at any point in its own
transaction without coupling it to real time.
*/

use file_types::file::{AdminControls, EmbargoStage, File};
use file_types::upstream::{ClinicalDonor, MatchedSamplePair, SongAnalysis};
use time::OffsetDateTime;

/// Number of whole months elapsed between `earlier` and `later`, floored
/// (a partial month never rounds up). Negative if `later` precedes
/// `earlier`.
fn months_between(later: OffsetDateTime, earlier: OffsetDateTime) -> i64 {
    let mut months =
        (later.year() as i64 - earlier.year() as i64) * 12 + (later.month() as i64 - earlier.month() as i64);
    if later.day() < earlier.day() {
        months -= 1;
    }
    months
}

/// Maps an embargo start date (or its absence) onto a stage, purely as a
/// function of elapsed time.
pub fn stage_for_date(start: Option<OffsetDateTime>, now: OffsetDateTime) -> EmbargoStage {
    let Some(start) = start else {
        return EmbargoStage::Unreleased;
    };
    match months_between(now, start) {
        m if m < 12 => EmbargoStage::ProgramOnly,
        m if m < 18 => EmbargoStage::MemberAccess,
        m if m < 24 => EmbargoStage::AssociateAccess,
        _ => EmbargoStage::Public,
    }
}

/// Applies admin overrides and the hold freeze on top of the date-derived
/// stage, per the ordering in §4.3: promote first, then demote.
pub fn calculate_stage(file: &File, now: OffsetDateTime) -> EmbargoStage {
    if file.embargo_start.is_none() {
        return EmbargoStage::Unreleased;
    }
    if file.admin.admin_hold {
        return file.embargo_stage;
    }

    let AdminControls { admin_promote, admin_demote, .. } = file.admin;
    let mut stage = stage_for_date(file.embargo_start, now);
    if let Some(promote) = admin_promote {
        stage = stage.max(promote);
    }
    if let Some(demote) = admin_demote {
        stage = stage.min(demote);
    }
    stage
}

/// Inputs to [`calculate_embargo_start_date`]: everything the calculator
/// needs is passed in explicitly rather than fetched, keeping the function
/// pure. The file manager is responsible for refreshing these from the
/// upstream collaborators in §6 before calling in.
pub struct EmbargoStartInputs<'a> {
    pub file: &'a File,
    pub song_analysis: &'a SongAnalysis,
    pub matched_sample_pairs: &'a [MatchedSamplePair],
    pub clinical_donor: Option<&'a ClinicalDonor>,
}

/// Computes the embargo start date per §4.3: absent unless clinical
/// completeness holds (or the file is clinically exempt), and then the
/// latest of the applicable candidates A/B/C.
pub fn calculate_embargo_start_date(inputs: EmbargoStartInputs) -> Option<OffsetDateTime> {
    let exempt = inputs.file.clinical_exemption.is_some();

    if !exempt {
        let complete = inputs
            .clinical_donor
            .map(|d| d.completion_stats.core_completion_percentage >= 1.0)
            .unwrap_or(false);
        if !complete {
            return None;
        }
    }

    let candidate_a = inputs.song_analysis.first_published_at;
    let candidate_a = candidate_a?;

    let candidate_b = if exempt {
        None
    } else {
        inputs.clinical_donor.and_then(|d| d.completion_stats.core_completion_date)
    };

    let candidate_c = if exempt {
        None
    } else {
        inputs
            .matched_sample_pairs
            .iter()
            .filter_map(|pair| match (&pair.normal, &pair.tumour) {
                (Some(n), Some(t)) => match (n.first_published_at, t.first_published_at) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    _ => None,
                },
                _ => None,
            })
            .max()
    };

    Some([Some(candidate_a), candidate_b, candidate_c].into_iter().flatten().max().unwrap_or(candidate_a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use file_types::file::{FileId, NewFile, SongPublishStatus};
    use file_types::upstream::{ClinicalDonor, CompletionStats, SampleFile};
    use time::macros::datetime;

    fn base_file(embargo_start: Option<OffsetDateTime>) -> File {
        let mut file = File::from_new(
            FileId::new(1),
            NewFile {
                object_id: "O1".into(),
                repo_id: "DC1".into(),
                program_id: "PRG1".into(),
                donor_id: "D1".into(),
                analysis_id: "A1".into(),
                status: SongPublishStatus::Published,
                first_published: datetime!(2020-01-01 0:00 UTC),
            },
        );
        file.embargo_start = embargo_start;
        file
    }

    #[test]
    fn no_start_is_unreleased() {
        let file = base_file(None);
        assert_eq!(calculate_stage(&file, datetime!(2025-01-01 0:00 UTC)), EmbargoStage::Unreleased);
    }

    #[test]
    fn exactly_twelve_months_is_member_access() {
        let start = datetime!(2020-01-01 0:00 UTC);
        let now = datetime!(2021-01-01 0:00 UTC);
        assert_eq!(stage_for_date(Some(start), now), EmbargoStage::MemberAccess);
    }

    #[test]
    fn exactly_eighteen_months_is_associate_access() {
        let start = datetime!(2020-01-01 0:00 UTC);
        let now = datetime!(2021-07-01 0:00 UTC);
        assert_eq!(stage_for_date(Some(start), now), EmbargoStage::AssociateAccess);
    }

    #[test]
    fn exactly_twenty_four_months_is_public() {
        let start = datetime!(2020-01-01 0:00 UTC);
        let now = datetime!(2022-01-01 0:00 UTC);
        assert_eq!(stage_for_date(Some(start), now), EmbargoStage::Public);
    }

    #[test]
    fn admin_hold_freezes_stage_regardless_of_date_or_overrides() {
        let mut file = base_file(Some(datetime!(2010-01-01 0:00 UTC)));
        file.embargo_stage = EmbargoStage::ProgramOnly;
        file.admin.admin_hold = true;
        file.admin.admin_promote = Some(EmbargoStage::Public);
        assert_eq!(calculate_stage(&file, datetime!(2025-01-01 0:00 UTC)), EmbargoStage::ProgramOnly);
    }

    #[test]
    fn promote_applies_before_demote() {
        let mut file = base_file(Some(datetime!(2024-06-01 0:00 UTC)));
        file.admin.admin_promote = Some(EmbargoStage::Public);
        file.admin.admin_demote = Some(EmbargoStage::MemberAccess);
        // Date-derived stage is ProgramOnly; promote bumps to Public, then
        // demote clamps down to MemberAccess -- not back to ProgramOnly.
        assert_eq!(calculate_stage(&file, datetime!(2024-07-01 0:00 UTC)), EmbargoStage::MemberAccess);
    }

    #[test]
    fn monotone_in_embargo_start() {
        let earlier_start = datetime!(2018-01-01 0:00 UTC);
        let later_start = datetime!(2023-01-01 0:00 UTC);
        let now = datetime!(2024-01-01 0:00 UTC);
        assert!(stage_for_date(Some(earlier_start), now) >= stage_for_date(Some(later_start), now));
    }

    #[test]
    fn clinical_exemption_bypasses_completeness_requirement() {
        let file = base_file(None);
        let mut exempt_file = file.clone();
        exempt_file.clinical_exemption = Some(file_types::file::ClinicalExemptionReason("OTHER".into()));

        let analysis = SongAnalysis {
            analysis_id: "A1".into(),
            analysis_state: "PUBLISHED".into(),
            first_published_at: Some(datetime!(2019-06-01 0:00 UTC)),
            study_id: None,
        };

        let start = calculate_embargo_start_date(EmbargoStartInputs {
            file: &exempt_file,
            song_analysis: &analysis,
            matched_sample_pairs: &[],
            clinical_donor: None,
        });
        assert_eq!(start, Some(datetime!(2019-06-01 0:00 UTC)));
    }

    #[test]
    fn missing_clinical_completeness_without_exemption_yields_no_start() {
        let file = base_file(None);
        let analysis = SongAnalysis {
            analysis_id: "A1".into(),
            analysis_state: "PUBLISHED".into(),
            first_published_at: Some(datetime!(2019-06-01 0:00 UTC)),
            study_id: None,
        };
        let start = calculate_embargo_start_date(EmbargoStartInputs {
            file: &file,
            song_analysis: &analysis,
            matched_sample_pairs: &[],
            clinical_donor: None,
        });
        assert_eq!(start, None);
    }

    #[test]
    fn start_is_max_of_applicable_candidates() {
        let file = base_file(None);
        let analysis = SongAnalysis {
            analysis_id: "A1".into(),
            analysis_state: "PUBLISHED".into(),
            first_published_at: Some(datetime!(2019-01-01 0:00 UTC)),
            study_id: None,
        };
        let donor = ClinicalDonor {
            donor_id: "D1".into(),
            program_id: "PRG1".into(),
            completion_stats: CompletionStats {
                core_completion_percentage: 1.0,
                core_completion_date: Some(datetime!(2020-05-01 0:00 UTC)),
            },
        };
        let pairs = vec![MatchedSamplePair {
            normal: Some(SampleFile { first_published_at: Some(datetime!(2020-08-01 0:00 UTC)) }),
            tumour: Some(SampleFile { first_published_at: Some(datetime!(2020-09-01 0:00 UTC)) }),
        }];
        let start = calculate_embargo_start_date(EmbargoStartInputs {
            file: &file,
            song_analysis: &analysis,
            matched_sample_pairs: &pairs,
            clinical_donor: Some(&donor),
        });
        assert_eq!(start, Some(datetime!(2020-09-01 0:00 UTC)));
    }

    #[test]
    fn unmatched_pair_sides_are_ignored() {
        let file = base_file(None);
        let analysis = SongAnalysis {
            analysis_id: "A1".into(),
            analysis_state: "PUBLISHED".into(),
            first_published_at: Some(datetime!(2019-01-01 0:00 UTC)),
            study_id: None,
        };
        let donor = ClinicalDonor {
            donor_id: "D1".into(),
            program_id: "PRG1".into(),
            completion_stats: CompletionStats { core_completion_percentage: 1.0, core_completion_date: None },
        };
        let pairs = vec![MatchedSamplePair {
            normal: Some(SampleFile { first_published_at: Some(datetime!(2030-01-01 0:00 UTC)) }),
            tumour: None,
        }];
        let start = calculate_embargo_start_date(EmbargoStartInputs {
            file: &file,
            song_analysis: &analysis,
            matched_sample_pairs: &pairs,
            clinical_donor: Some(&donor),
        });
        assert_eq!(start, Some(datetime!(2019-01-01 0:00 UTC)));
    }
}
