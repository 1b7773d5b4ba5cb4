/// Constants used throughout the baokit codebase
// Reference grammar
pub const SECRET_SCHEME_PREFIX: &str = "bao:";
pub const WRITE_MODE_MARKER: &str = ">>";
pub const REFERENCE_SEPARATOR: char = '#';
pub const LATEST_VERSION: &str = "-1";
pub const EMPTY_WRITE_PAYLOAD: &str = "{}";

// Reserved token-echo pair
pub const TOKEN_ECHO_NAME: &str = "BAO_TOKEN";
pub const TOKEN_ECHO_PATH: &str = "login";

// Transit defaults
pub const DEFAULT_TRANSIT_PATH: &str = "transit";
pub const DEFAULT_TRANSIT_BATCH_SIZE: usize = 25;

// Client defaults
pub const DEFAULT_VAULT_ADDR: &str = "https://127.0.0.1:8200";
pub const DEFAULT_ROLE: &str = "default";
pub const DEFAULT_AUTH_PATH: &str = "kubernetes";
pub const DEFAULT_TOKEN_FILE: &str = ".vault-token";
pub const DEFAULT_JWT_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOGIN_BACKOFF_SECS: u64 = 1;

// Kubernetes secret mounts swap this symlink atomically on update
pub const ATOMIC_SWAP_MARKER: &str = "..data";

// Environment variable names
pub const VAULT_ADDR_VAR: &str = "VAULT_ADDR";
pub const VAULT_TOKEN_VAR: &str = "VAULT_TOKEN";
pub const VAULT_TOKEN_PATH_VAR: &str = "VAULT_TOKEN_PATH";
pub const VAULT_CLIENT_TIMEOUT_VAR: &str = "VAULT_CLIENT_TIMEOUT";
pub const VAULT_NAMESPACE_VAR: &str = "VAULT_NAMESPACE";
pub const VAULT_CACERT_VAR: &str = "VAULT_CACERT";
pub const VAULT_CACERT_RELOAD_VAR: &str = "VAULT_CACERT_RELOAD";
pub const VAULT_SKIP_VERIFY_VAR: &str = "VAULT_SKIP_VERIFY";
pub const VAULT_JWT_FILE_VAR: &str = "VAULT_JWT_FILE";
pub const SERVICE_ACCOUNT_TOKEN_VAR: &str = "KUBERNETES_SERVICE_ACCOUNT_TOKEN";
pub const BAOKIT_LOG_VAR: &str = "BAOKIT_LOG";

// HTTP headers understood by the vault API
pub const TOKEN_HEADER: &str = "X-Vault-Token";
pub const NAMESPACE_HEADER: &str = "X-Vault-Namespace";
pub const REQUEST_HEADER: &str = "X-Vault-Request";
