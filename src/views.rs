//! Read-only projections of the current job list against the saved and
//! applied id sets. Always recomputed from their inputs; job-list order wins.

use crate::marks::IdSet;
use crate::models::Job;

pub fn visible_jobs<'a>(jobs: &'a [Job], applied: &IdSet) -> Vec<&'a Job> {
    jobs.iter().filter(|job| !applied.contains(&job.id)).collect()
}

pub fn saved_jobs<'a>(jobs: &'a [Job], saved: &IdSet) -> Vec<&'a Job> {
    jobs.iter().filter(|job| saved.contains(&job.id)).collect()
}

pub fn applied_jobs<'a>(jobs: &'a [Job], applied: &IdSet) -> Vec<&'a Job> {
    jobs.iter().filter(|job| applied.contains(&job.id)).collect()
}

#[derive(Debug)]
pub struct JobViews<'a> {
    pub visible: Vec<&'a Job>,
    pub saved: Vec<&'a Job>,
    pub applied: Vec<&'a Job>,
}

impl<'a> JobViews<'a> {
    pub fn build(jobs: &'a [Job], saved: &IdSet, applied: &IdSet) -> Self {
        Self {
            visible: visible_jobs(jobs, applied),
            saved: saved_jobs(jobs, saved),
            applied: applied_jobs(jobs, applied),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marks::toggle;
    use crate::models::sample_job;

    fn jobs(n: usize) -> Vec<Job> {
        (1..=n).map(|i| sample_job(&format!("job-{}", i))).collect()
    }

    fn ids(values: &[&str]) -> IdSet {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn job_ids(list: &[&Job]) -> Vec<String> {
        list.iter().map(|j| j.id.clone()).collect()
    }

    #[test]
    fn test_fresh_result_set_is_all_visible() {
        let jobs = jobs(25);
        let views = JobViews::build(&jobs, &IdSet::new(), &IdSet::new());
        assert_eq!(views.visible.len(), 25);
        assert!(views.saved.is_empty());
        assert!(views.applied.is_empty());
    }

    #[test]
    fn test_visible_is_jobs_minus_applied() {
        let jobs = jobs(6);
        let applied = ids(&["job-2", "job-5", "job-99"]);
        let visible = visible_jobs(&jobs, &applied);
        assert_eq!(job_ids(&visible), vec!["job-1", "job-3", "job-4", "job-6"]);
    }

    #[test]
    fn test_applying_moves_job_out_of_visible() {
        let jobs = jobs(10);
        let applied = toggle(&IdSet::new(), "job-7");

        let views = JobViews::build(&jobs, &IdSet::new(), &applied);
        assert_eq!(views.visible.len(), 9);
        assert!(views.visible.iter().all(|j| j.id != "job-7"));
        assert_eq!(views.applied.len(), 1);
        assert_eq!(views.applied[0], &jobs[6]);
    }

    #[test]
    fn test_saved_follows_job_order_not_save_order() {
        let jobs = jobs(5);
        let saved = ids(&["job-4", "job-1", "job-3"]);
        assert_eq!(job_ids(&saved_jobs(&jobs, &saved)), vec!["job-1", "job-3", "job-4"]);
    }

    #[test]
    fn test_saved_and_applied_overlap() {
        let jobs = jobs(3);
        let marked = ids(&["job-2"]);
        let views = JobViews::build(&jobs, &marked, &marked);
        assert_eq!(job_ids(&views.saved), vec!["job-2"]);
        assert_eq!(job_ids(&views.applied), vec!["job-2"]);
        assert_eq!(job_ids(&views.visible), vec!["job-1", "job-3"]);
    }

    #[test]
    fn test_unknown_ids_are_dropped() {
        let jobs = jobs(2);
        let saved = ids(&["job-3"]);
        let views = JobViews::build(&jobs, &saved, &IdSet::new());
        assert!(views.saved.is_empty());
        assert_eq!(views.visible.len(), 2);
    }
}
