//! `gix`-backed ref and rev-parse operations.

use gix::refs::transaction::PreviousValue;

use crate::error::GitError;
use crate::gix_repo::GixRepo;
use crate::types::*;

fn to_gix_oid(oid: GitOid) -> gix::ObjectId {
    gix::ObjectId::from_bytes_or_panic(oid.as_bytes())
}

fn from_gix_oid(oid: gix::ObjectId) -> GitOid {
    let bytes: [u8; 20] = oid.as_bytes().try_into().expect("SHA1 is 20 bytes");
    GitOid::from_bytes(bytes)
}

pub fn read_ref(repo: &GixRepo, name: &RefName) -> Result<Option<GitOid>, GitError> {
    let found = repo
        .repo
        .try_find_reference(name.as_str())
        .map_err(|e| GitError::BackendError { message: format!("reading ref {name}: {e}") })?;
    let Some(mut reference) = found else {
        return Ok(None);
    };
    let id = reference
        .peel_to_id_in_place()
        .map_err(|e| GitError::BackendError { message: format!("peeling ref {name}: {e}") })?;
    Ok(Some(from_gix_oid(id.detach())))
}

pub fn write_ref(repo: &GixRepo, name: &RefName, oid: GitOid, log_message: &str) -> Result<(), GitError> {
    repo.repo
        .reference(name.as_str(), to_gix_oid(oid), PreviousValue::Any, log_message)
        .map_err(|e| GitError::BackendError { message: format!("writing ref {name}: {e}") })?;
    Ok(())
}

pub fn delete_ref(repo: &GixRepo, name: &RefName) -> Result<(), GitError> {
    if let Some(reference) = repo
        .repo
        .try_find_reference(name.as_str())
        .map_err(|e| GitError::BackendError { message: format!("looking up ref {name}: {e}") })?
    {
        reference
            .delete()
            .map_err(|e| GitError::BackendError { message: format!("deleting ref {name}: {e}") })?;
    }
    Ok(())
}

pub fn list_refs(repo: &GixRepo, prefix: &str) -> Result<Vec<(RefName, GitOid)>, GitError> {
    let platform = repo
        .repo
        .references()
        .map_err(|e| GitError::BackendError { message: format!("listing refs: {e}") })?;
    let iter = platform
        .prefixed(prefix)
        .map_err(|e| GitError::BackendError { message: format!("listing refs under {prefix}: {e}") })?;

    let mut out = Vec::new();
    for result in iter {
        let mut reference = result
            .map_err(|e| GitError::BackendError { message: format!("iterating refs: {e}") })?;
        let name = reference.name().as_bstr().to_string();
        let id = reference
            .peel_to_id_in_place()
            .map_err(|e| GitError::BackendError { message: format!("peeling ref {name}: {e}") })?;
        let ref_name = RefName::new(name.clone())
            .map_err(|e| GitError::BackendError { message: format!("ref {name}: {e}") })?;
        out.push((ref_name, from_gix_oid(id.detach())));
    }
    out.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
    Ok(out)
}

pub fn rev_parse_opt(repo: &GixRepo, spec: &str) -> Result<Option<GitOid>, GitError> {
    match repo.repo.rev_parse_single(spec) {
        Ok(id) => Ok(Some(from_gix_oid(id.detach()))),
        Err(_) => Ok(None),
    }
}
