//! # Names
//!
//! Deterministic derivation of every Vault-side identifier from a resource's
//! kind, namespace and name. Paths must be stable across reconciliations;
//! renames are not supported and surface as delete + create.

/// Mount path of a managed KV engine.
pub fn kv_engine_mount_path(namespace: &str, name: &str) -> String {
    format!("managed/kv/{namespace}/{name}")
}

/// Mount path of a managed transit engine.
pub fn transit_engine_mount_path(namespace: &str, name: &str) -> String {
    format!("managed/transit_engine/{namespace}/{name}")
}

/// Mount path of a managed PKI engine.
pub fn pki_mount_path(namespace: &str, name: &str) -> String {
    format!("managed/pki/{namespace}/{name}")
}

/// Path of the internal KV secret holding a CA's public metadata.
pub fn ca_public_info_path(namespace: &str, name: &str) -> String {
    format!("{namespace}/pki/ca/public/{name}")
}

/// Path of the internal KV secret holding a CA's private metadata.
pub fn ca_private_info_path(namespace: &str, name: &str) -> String {
    format!("{namespace}/pki/ca/private/{name}")
}

/// Name of a certificate role on its issuer's PKI mount.
pub fn certificate_role_name(namespace: &str, name: &str) -> String {
    format!("managed.pki.cert.{namespace}.{name}")
}

/// Name of the Vault kubernetes-auth role for a subject.
pub fn vault_auth_role_name(namespace: &str, subject: &str) -> String {
    format!("managed.k8s.{namespace}.{subject}")
}

/// Name of the read policy for a VaultKVSecret.
pub fn kv_secret_policy_name(namespace: &str, name: &str) -> String {
    format!("managed.kv.{namespace}.{name}")
}

pub fn ca_public_policy_name(namespace: &str, name: &str) -> String {
    format!("managed.pki.ca.public.{namespace}.{name}")
}

pub fn ca_private_policy_name(namespace: &str, name: &str) -> String {
    format!("managed.pki.ca.private.{namespace}.{name}")
}

pub fn certificate_issue_policy_name(namespace: &str, name: &str) -> String {
    format!("managed.pki.cert.issue.{namespace}.{name}")
}

pub fn certificate_sign_csr_policy_name(namespace: &str, name: &str) -> String {
    format!("managed.pki.cert.sign-csr.{namespace}.{name}")
}

pub fn certificate_sign_verbatim_policy_name(namespace: &str, name: &str) -> String {
    format!("managed.pki.cert.sign-verbatim.{namespace}.{name}")
}

/// Name of a transit key capability policy (`read`, `encrypt`, `decrypt`,
/// `rewrap`, `datakey`, `hmac`, `sign`, `verify`).
pub fn transit_key_policy_name(capability: &str, namespace: &str, name: &str) -> String {
    format!("managed.transit.key.{capability}.{namespace}.{name}")
}

/// Name of the cluster Role/RoleBinding granting a subject read access to
/// its client config.
pub fn client_config_rbac_name(subject: &str) -> String {
    format!("{subject}-client-config")
}

/// Join two path segments, tolerating empty prefixes and stray slashes.
pub fn join_path(base: &str, rest: &str) -> String {
    let base = base.trim_matches('/');
    let rest = rest.trim_matches('/');
    if base.is_empty() {
        rest.to_string()
    } else if rest.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{rest}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_mount_paths() {
        assert_eq!(kv_engine_mount_path("ns", "e"), "managed/kv/ns/e");
        assert_eq!(
            transit_engine_mount_path("ns", "e"),
            "managed/transit_engine/ns/e"
        );
        assert_eq!(pki_mount_path("ns", "ca"), "managed/pki/ns/ca");
    }

    #[test]
    fn internal_kv_paths() {
        assert_eq!(ca_public_info_path("ns", "ca"), "ns/pki/ca/public/ca");
        assert_eq!(ca_private_info_path("ns", "ca"), "ns/pki/ca/private/ca");
    }

    #[test]
    fn policy_names() {
        assert_eq!(kv_secret_policy_name("ns", "s"), "managed.kv.ns.s");
        assert_eq!(ca_public_policy_name("ns", "ca"), "managed.pki.ca.public.ns.ca");
        assert_eq!(
            ca_private_policy_name("ns", "ca"),
            "managed.pki.ca.private.ns.ca"
        );
        assert_eq!(
            certificate_issue_policy_name("ns", "c"),
            "managed.pki.cert.issue.ns.c"
        );
        assert_eq!(
            certificate_sign_csr_policy_name("ns", "c"),
            "managed.pki.cert.sign-csr.ns.c"
        );
        assert_eq!(
            certificate_sign_verbatim_policy_name("ns", "c"),
            "managed.pki.cert.sign-verbatim.ns.c"
        );
        assert_eq!(
            transit_key_policy_name("encrypt", "ns", "k"),
            "managed.transit.key.encrypt.ns.k"
        );
    }

    #[test]
    fn role_names() {
        assert_eq!(certificate_role_name("ns", "c"), "managed.pki.cert.ns.c");
        assert_eq!(vault_auth_role_name("ns", "sa"), "managed.k8s.ns.sa");
        assert_eq!(client_config_rbac_name("sa"), "sa-client-config");
    }

    #[test]
    fn join_path_handles_empty_and_slashes() {
        assert_eq!(join_path("", "name"), "name");
        assert_eq!(join_path("base", ""), "base");
        assert_eq!(join_path("base/", "/name"), "base/name");
        assert_eq!(join_path("a/b", "c"), "a/b/c");
    }
}
