//! Static generation context: the fixed vocabulary the prompts draw from.
//!
//! Keeping these as data (instead of asking the model to invent them)
//! shortens prompts and keeps the corpus consistent enough to group.

/// Operating systems assigned to generated tickets.
pub static OSES: [&str; 4] = [
    "Windows 10",
    "Windows 11",
    "Windows Server 2019",
    "Windows Server 2016",
];

/// (category, service) pairs a batch is generated for.
pub static CATEGORY_SERVICES: [(&str, &str); 73] = [
    // Network
    ("Network", "VPN"),
    ("Network", "DNS"),
    ("Network", "DHCP"),
    ("Network", "Firewall"),
    ("Network", "Proxy"),
    ("Network", "Load Balancer"),
    ("Network", "WLAN"),
    ("Network", "Switching"),
    ("Network", "Routing"),
    ("Network", "TLS/SSL"),
    // Access & identity
    ("Access", "AD Login"),
    ("Access", "LDAP"),
    ("Access", "SSO"),
    ("Access", "MFA"),
    ("Access", "Password Reset"),
    ("Access", "Kerberos"),
    ("Access", "Azure AD"),
    ("Access", "Conditional Access"),
    // Hardware / workplace
    ("Hardware", "Printer"),
    ("Hardware", "Scanner"),
    ("Hardware", "ThinClient"),
    ("Hardware", "Monitor"),
    ("Hardware", "Dockingstation"),
    ("Hardware", "Webcam"),
    ("Hardware", "Keyboard"),
    ("Hardware", "Headset"),
    // Software / desktop clients
    ("Software", "Office"),
    ("Software", "Outlook"),
    ("Software", "Teams"),
    ("Software", "Browser"),
    ("Software", "PDF Viewer"),
    ("Software", "Antivirus Client"),
    ("Software", "VPN Client"),
    ("Software", "Java Runtime"),
    ("Software", "Citrix Workspace"),
    ("Software", "SAP GUI"),
    ("Software", "AutoCAD"),
    ("Software", "PowerShell"),
    ("Software", "VS Code"),
    // Web / backend services
    ("Web", "Intranet"),
    ("Web", "Reverse Proxy"),
    ("Web", "WebAPI"),
    ("Web", "SSRS Reports"),
    ("Web", "SharePoint"),
    ("Web", "CMS"),
    // Database
    ("Database", "MSSQL"),
    ("Database", "Oracle"),
    ("Database", "PostgreSQL"),
    ("Database", "MySQL"),
    ("Database", "Redis"),
    ("Database", "ElasticSearch"),
    // Storage / backup
    ("Storage", "Fileserver"),
    ("Storage", "NAS"),
    ("Backup", "Veeam"),
    ("Backup", "Snapshot Restore"),
    ("Backup", "Tape Library"),
    // Security
    ("Security", "Endpoint AV"),
    ("Security", "EDR"),
    ("Security", "SIEM"),
    ("Security", "Email Security"),
    ("Security", "DLP"),
    ("Security", "Certificate Services"),
    // Cloud
    ("Cloud", "Azure Functions"),
    ("Cloud", "Azure Storage"),
    ("Cloud", "AWS S3"),
    ("Cloud", "AWS Lambda"),
    // Messaging
    ("Messaging", "Exchange Online"),
    ("Messaging", "SMTP Relay"),
    ("Messaging", "IMAP/POP3"),
    // DevOps
    ("DevOps", "GitLab CI"),
    ("DevOps", "Jenkins"),
    ("DevOps", "Docker Registry"),
    ("DevOps", "Kubernetes"),
];

/// Issue-type tags the model may assign.
pub static ISSUE_TYPES: [&str; 8] = [
    "AuthenticationError",
    "ConnectivityIssue",
    "PermissionDenied",
    "Timeout",
    "ClientBug",
    "Misconfiguration",
    "OutOfMemory",
    "ServiceUnavailable",
];

/// Error codes the model may assign (empty string = no code).
pub static ERROR_CODES: [&str; 7] = [
    "0x80070005",
    "ERR_SSL_VERSION",
    "ERR_PROXY_CONNECTION_FAILED",
    "0x80004005",
    "404",
    "503",
    "",
];

// ---------------------------------------------------------------------------
// Assignee routing
// ---------------------------------------------------------------------------

/// Support groups and their assignees.
static GROUPS: [(&str, &str); 12] = [
    ("IT Service Desk", "Martin Köhler"),
    ("Network Operations", "Tobias Neumann"),
    ("Security Team", "Svenja Brandt"),
    ("ClientSupport", "Kevin Schulz"),
    ("Application Support", "Laura Bergmann"),
    ("Database Administration", "Nikolai Richter"),
    ("Cloud Services Team", "Melanie Schröder"),
    ("DevOps Team", "Jonas Falk"),
    ("Helpdesk Level", "Patrick Hoff"),
    ("Infrastructure Team", "Daniel Krause"),
    ("Email Support Team", "Sarah Krüger"),
    ("Mobile Device Support", "Julia Pfeiffer"),
];

/// Route a (category, service) pair to its assignee.
///
/// Service-level exceptions first, then category defaults.
pub fn assignee_for(category: &str, service: &str) -> &'static str {
    match (category, service) {
        ("Access", "Password Reset") => "Martin Köhler",
        ("Software", "Antivirus Client") => "Svenja Brandt",
        ("Software", "VPN Client") => "Tobias Neumann",
        ("Web", "Reverse Proxy" | "WebAPI" | "SSRS Reports") => "Daniel Krause",
        ("Network", _) => "Tobias Neumann",
        ("Access", _) => "Kevin Schulz",
        ("Hardware", _) => "Patrick Hoff",
        ("Software", _) | ("Web", _) => "Laura Bergmann",
        ("Database", _) => "Nikolai Richter",
        ("Storage", _) | ("Backup", _) => "Daniel Krause",
        ("Security", _) => "Svenja Brandt",
        ("Cloud", _) => "Melanie Schröder",
        ("Messaging", _) => "Sarah Krüger",
        ("DevOps", _) => "Jonas Falk",
        _ => "Martin Köhler",
    }
}

/// Support group for an assignee, with a service-desk fallback.
pub fn group_for(assignee: &str) -> &'static str {
    GROUPS
        .iter()
        .find(|(_, a)| *a == assignee)
        .map(|(g, _)| *g)
        .unwrap_or("IT Service Desk")
}

// ---------------------------------------------------------------------------
// Reporter directory
// ---------------------------------------------------------------------------

/// A workplace identity tickets are reported from. Every ticket in a batch
/// draws its reporter/hostname/site triple from this directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserSeed {
    pub hostname: &'static str,
    pub reporter: &'static str,
    pub site: &'static str,
}

const fn user(hostname: &'static str, reporter: &'static str, site: &'static str) -> UserSeed {
    UserSeed {
        hostname,
        reporter,
        site,
    }
}

/// Reporter candidate pool.
pub static USER_DIRECTORY: [UserSeed; 36] = [
    user("COMP-482910", "Paul Klein", "Berlin"),
    user("COMP-019384", "Anna Schmidt", "München"),
    user("COMP-593027", "Noah Wolf", "Hamburg"),
    user("COMP-740192", "Mara Weber", "Köln"),
    user("COMP-128503", "Ben Fischer", "Remote"),
    user("COMP-904812", "Chris Becker", "Stuttgart"),
    user("COMP-335729", "Dana Hoffmann", "Dortmund"),
    user("COMP-672104", "Fatma Wagner", "Leipzig"),
    user("COMP-208315", "Olga Meyer", "Düsseldorf"),
    user("COMP-519807", "Erik Klein", "Hannover"),
    user("COMP-847120", "Lukas Schmidt", "Berlin"),
    user("COMP-193475", "Rita Wolf", "Bremen"),
    user("COMP-660284", "Paul Becker", "Köln"),
    user("COMP-401928", "Mara Klein", "Hamburg"),
    user("COMP-275619", "Anna Weber", "Nürnberg"),
    user("COMP-983012", "Ben Meyer", "Remote"),
    user("COMP-507438", "Chris Wolf", "Bochum"),
    user("COMP-749205", "Dana Fischer", "Frankfurt"),
    user("COMP-316804", "Noah Wagner", "Berlin"),
    user("COMP-128947", "Fatma Schmidt", "Hannover"),
    user("COMP-560129", "Olga Hoffmann", "München"),
    user("COMP-892014", "Erik Weber", "Stuttgart"),
    user("COMP-230598", "Paul Meyer", "Köln"),
    user("COMP-741203", "Rita Becker", "Berlin"),
    user("COMP-198407", "Lukas Wagner", "Leipzig"),
    user("COMP-673015", "Anna Klein", "Düsseldorf"),
    user("COMP-259781", "Chris Schmidt", "Hamburg"),
    user("COMP-904317", "Dana Meyer", "Remote"),
    user("COMP-341892", "Ben Wolf", "Frankfurt"),
    user("COMP-782054", "Noah Hoffmann", "Berlin"),
    user("COMP-156902", "Fatma Klein", "Nürnberg"),
    user("COMP-620487", "Olga Wolf", "Bochum"),
    user("COMP-874201", "Erik Fischer", "Stuttgart"),
    user("COMP-239510", "Rita Schmidt", "München"),
    user("COMP-708312", "Paul Weber", "Remote"),
    user("COMP-492038", "Mara Wolf", "Berlin"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_service_routes_to_a_known_group() {
        for (category, service) in CATEGORY_SERVICES {
            let assignee = assignee_for(category, service);
            let group = group_for(assignee);
            assert!(
                GROUPS.iter().any(|(g, _)| *g == group),
                "{category}/{service} routed to unknown group {group}"
            );
        }
    }

    #[test]
    fn service_level_exceptions_override_category_default() {
        assert_eq!(assignee_for("Access", "Password Reset"), "Martin Köhler");
        assert_eq!(assignee_for("Access", "SSO"), "Kevin Schulz");
        assert_eq!(assignee_for("Software", "VPN Client"), "Tobias Neumann");
        assert_eq!(assignee_for("Software", "Teams"), "Laura Bergmann");
    }

    #[test]
    fn unknown_assignee_falls_back_to_service_desk() {
        assert_eq!(group_for("Nobody Known"), "IT Service Desk");
        assert_eq!(group_for("Tobias Neumann"), "Network Operations");
    }

    #[test]
    fn reporter_directory_has_unique_hostnames() {
        let mut hostnames: Vec<&str> = USER_DIRECTORY.iter().map(|u| u.hostname).collect();
        hostnames.sort_unstable();
        hostnames.dedup();
        assert_eq!(hostnames.len(), USER_DIRECTORY.len());
    }
}
