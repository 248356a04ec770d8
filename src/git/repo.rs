use chrono::{DateTime, FixedOffset, Offset, Utc};
use git2::{BranchType, Delta, DiffOptions, ErrorCode, ObjectType, Oid, Patch, Repository, Sort, TreeWalkMode, TreeWalkResult};
use std::path::Path;

use super::{CommitInfo, DiffEntry, GitError, RepositoryReader, TreeEntry};

/// [`RepositoryReader`] backed by libgit2.
pub struct GitRepository {
    repo: Repository,
}

impl GitRepository {
    /// Open the repository at `path` (a work tree or a bare repository).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let path = path.as_ref();
        let repo = Repository::open(path).map_err(|source| GitError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { repo })
    }

    /// Wrap an already opened repository.
    pub fn from_repository(repo: Repository) -> Self {
        Self { repo }
    }

    fn oid(&self, id: &str) -> Result<Oid, GitError> {
        Oid::from_str(id).map_err(|_| GitError::RevisionNotFound(id.to_string()))
    }

    fn find_commit(&self, id: &str) -> Result<git2::Commit<'_>, GitError> {
        let oid = self.oid(id)?;
        self.repo.find_commit(oid).map_err(|e| match e.code() {
            ErrorCode::NotFound => GitError::RevisionNotFound(id.to_string()),
            _ => GitError::Git(e),
        })
    }

    fn branch_oid(&self, branch: &str) -> Result<Oid, GitError> {
        let found = self
            .repo
            .find_branch(branch, BranchType::Local)
            .map_err(|e| match e.code() {
                ErrorCode::NotFound => GitError::BranchNotFound(branch.to_string()),
                _ => GitError::Git(e),
            })?;
        Ok(found.get().peel_to_commit()?.id())
    }
}

impl RepositoryReader for GitRepository {
    fn location(&self) -> String {
        self.repo
            .workdir()
            .unwrap_or_else(|| self.repo.path())
            .display()
            .to_string()
    }

    fn head_branch(&self) -> Result<String, GitError> {
        let head = self.repo.head().map_err(|e| match e.code() {
            ErrorCode::UnbornBranch | ErrorCode::NotFound => GitError::NoHeadBranch,
            _ => GitError::Git(e),
        })?;
        if !head.is_branch() {
            return Err(GitError::NoHeadBranch);
        }
        head.shorthand()
            .map(str::to_string)
            .ok_or(GitError::NoHeadBranch)
    }

    fn branch_tip(&self, branch: &str) -> Result<String, GitError> {
        Ok(self.branch_oid(branch)?.to_string())
    }

    fn resolve(&self, revspec: &str) -> Result<String, GitError> {
        let object = self
            .repo
            .revparse_single(revspec)
            .map_err(|_| GitError::RevisionNotFound(revspec.to_string()))?;
        let commit = object
            .peel_to_commit()
            .map_err(|_| GitError::RevisionNotFound(revspec.to_string()))?;
        Ok(commit.id().to_string())
    }

    fn branch_contains(&self, branch: &str, commit: &str) -> Result<bool, GitError> {
        let tip = self.branch_oid(branch)?;
        let oid = self.oid(commit)?;
        if tip == oid {
            return Ok(true);
        }
        Ok(self.repo.graph_descendant_of(tip, oid)?)
    }

    fn walk(&self, branch: &str, since: Option<&str>) -> Result<Vec<String>, GitError> {
        let tip = self.branch_oid(branch)?;
        let mut walker = self.repo.revwalk()?;
        walker.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
        walker.push(tip)?;
        if let Some(since) = since {
            walker.hide(self.oid(since)?)?;
        }

        walker
            .map(|oid| oid.map(|oid| oid.to_string()).map_err(GitError::from))
            .collect()
    }

    fn commit(&self, id: &str) -> Result<CommitInfo, GitError> {
        let commit = self.find_commit(id)?;
        let author = commit.author();
        let committer = commit.committer();

        Ok(CommitInfo {
            id: commit.id().to_string(),
            message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
            author_name: String::from_utf8_lossy(author.name_bytes()).into_owned(),
            author_email: String::from_utf8_lossy(author.email_bytes()).into_owned(),
            author_date: to_datetime(author.when()),
            committer_name: String::from_utf8_lossy(committer.name_bytes()).into_owned(),
            committer_email: String::from_utf8_lossy(committer.email_bytes()).into_owned(),
            commit_date: to_datetime(committer.when()),
            parent_ids: commit.parent_ids().map(|oid| oid.to_string()).collect(),
        })
    }

    fn tree(&self, commit: &str) -> Result<Vec<TreeEntry>, GitError> {
        let tree = self.find_commit(commit)?.tree()?;
        let mut entries = Vec::new();

        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                let name = String::from_utf8_lossy(entry.name_bytes());
                entries.push(TreeEntry {
                    path: format!("{}{}", root, name),
                    blob_id: entry.id().to_string(),
                });
            }
            TreeWalkResult::Ok
        })?;

        Ok(entries)
    }

    fn diff(&self, base: Option<&str>, target: &str) -> Result<Vec<DiffEntry>, GitError> {
        let target_tree = self.find_commit(target)?.tree()?;
        let base_tree = match base {
            Some(base) => Some(self.find_commit(base)?.tree()?),
            None => None,
        };

        let mut opts = DiffOptions::new();
        opts.include_typechange(true);
        let diff = self
            .repo
            .diff_tree_to_tree(base_tree.as_ref(), Some(&target_tree), Some(&mut opts))?;

        let mut entries = Vec::with_capacity(diff.deltas().len());
        for (idx, delta) in diff.deltas().enumerate() {
            let (lines_added, lines_deleted) = match Patch::from_diff(&diff, idx)? {
                Some(patch) => {
                    let (_, added, deleted) = patch.line_stats()?;
                    (added, deleted)
                }
                None => (0, 0),
            };

            let old_path = delta_path(delta.old_file().path());
            let new_path = delta_path(delta.new_file().path());
            entries.push(DiffEntry {
                old_path,
                new_path,
                change_type: delta_letter(delta.status()),
                old_blob: delta.old_file().id().to_string(),
                new_blob: delta.new_file().id().to_string(),
                lines_added,
                lines_deleted,
            });
        }

        Ok(entries)
    }

    fn blob(&self, id: &str) -> Result<Option<Vec<u8>>, GitError> {
        let oid = match Oid::from_str(id) {
            Ok(oid) => oid,
            Err(_) => return Ok(None),
        };
        match self.repo.find_blob(oid) {
            Ok(blob) => Ok(Some(blob.content().to_vec())),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::Git(e)),
        }
    }
}

fn delta_path(path: Option<&Path>) -> String {
    path.map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default()
}

/// Single-letter status code for a delta.
pub(crate) fn delta_letter(status: Delta) -> char {
    match status {
        Delta::Added => 'A',
        Delta::Modified => 'M',
        Delta::Deleted => 'D',
        Delta::Renamed => 'R',
        Delta::Copied => 'C',
        Delta::Unmodified => '=',
        Delta::Untracked => '?',
        Delta::Typechange => 'T',
        Delta::Unreadable => '!',
        Delta::Conflicted => 'U',
        Delta::Ignored => 'I',
        #[allow(unreachable_patterns)]
        _ => 'X',
    }
}

/// Convert git2::Time to chrono DateTime with timezone offset.
fn to_datetime(time: git2::Time) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(time.offset_minutes() * 60).unwrap_or_else(|| Utc.fix());
    DateTime::from_timestamp(time.seconds(), 0)
        .unwrap_or_default()
        .with_timezone(&offset)
}
