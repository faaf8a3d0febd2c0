//! Static descriptions of the cloud services that can appear in an
//! architecture, keyed by canonical identifier.
//!
//! Lookups never fail: a name is resolved through the canonical table, then
//! the alias table, then a list of substring heuristics, and finally lands
//! on a generic record.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProviderLinks {
    pub aws: &'static str,
    pub gcp: &'static str,
    pub azure: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceMetadata {
    pub desc: &'static str,
    pub how_it_works: &'static str,
    pub pros: &'static [&'static str],
    pub cons: &'static [&'static str],
    pub best_for: &'static [&'static str],
    pub links: ProviderLinks,
}

pub const GENERIC_SERVICE: ServiceMetadata = ServiceMetadata {
    desc: "No description available",
    how_it_works: "This component is provisioned by the generated architecture.",
    pros: &["Managed by your cloud provider"],
    cons: &["Details depend on the selected provider"],
    best_for: &["General workloads"],
    links: ProviderLinks {
        aws: "https://docs.aws.amazon.com/",
        gcp: "https://cloud.google.com/docs",
        azure: "https://learn.microsoft.com/azure/",
    },
};

static SERVICES: &[(&str, ServiceMetadata)] = &[
    (
        "compute",
        ServiceMetadata {
            desc: "Virtual machines running your application servers.",
            how_it_works: "Instances boot from an image inside your network and scale through an instance group.",
            pros: &["Full control over the runtime", "Predictable performance"],
            cons: &["You patch and operate the OS", "Idle capacity still costs money"],
            best_for: &["Legacy workloads", "Long-running processes"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/ec2/",
                gcp: "https://cloud.google.com/compute/docs",
                azure: "https://learn.microsoft.com/azure/virtual-machines/",
            },
        },
    ),
    (
        "container_orchestration",
        ServiceMetadata {
            desc: "Managed Kubernetes cluster for containerised services.",
            how_it_works: "The control plane schedules pods onto worker nodes and restarts them when they fail.",
            pros: &["Portable workloads", "Rich ecosystem"],
            cons: &["Operational complexity", "Cluster baseline cost"],
            best_for: &["Microservices", "Multi-team platforms"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/eks/",
                gcp: "https://cloud.google.com/kubernetes-engine/docs",
                azure: "https://learn.microsoft.com/azure/aks/",
            },
        },
    ),
    (
        "container_service",
        ServiceMetadata {
            desc: "Serverless containers without cluster management.",
            how_it_works: "You push an image; the platform runs and scales it behind an HTTPS endpoint.",
            pros: &["No cluster to manage", "Scales to zero"],
            cons: &["Less control over networking", "Cold starts"],
            best_for: &["Web APIs", "Background workers"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/AmazonECS/latest/developerguide/AWS_Fargate.html",
                gcp: "https://cloud.google.com/run/docs",
                azure: "https://learn.microsoft.com/azure/container-apps/",
            },
        },
    ),
    (
        "serverless_compute",
        ServiceMetadata {
            desc: "Event-driven functions billed per invocation.",
            how_it_works: "Code runs in short-lived sandboxes triggered by HTTP calls, queues or schedules.",
            pros: &["Pay per use", "Zero server management"],
            cons: &["Execution time limits", "Cold starts"],
            best_for: &["Glue code", "Spiky traffic"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/lambda/",
                gcp: "https://cloud.google.com/functions/docs",
                azure: "https://learn.microsoft.com/azure/azure-functions/",
            },
        },
    ),
    (
        "relational_database",
        ServiceMetadata {
            desc: "Managed SQL database with automated backups.",
            how_it_works: "A primary instance serves writes while standby replicas take over on failure.",
            pros: &["ACID transactions", "Mature tooling"],
            cons: &["Vertical scaling limits", "Schema migrations"],
            best_for: &["Transactional data", "Reporting"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/rds/",
                gcp: "https://cloud.google.com/sql/docs",
                azure: "https://learn.microsoft.com/azure/azure-sql/",
            },
        },
    ),
    (
        "nosql_database",
        ServiceMetadata {
            desc: "Serverless key-value and document store.",
            how_it_works: "Items are partitioned by key across storage nodes with single-digit millisecond reads.",
            pros: &["Horizontal scale", "Flexible schema"],
            cons: &["Limited query patterns", "Careful key design required"],
            best_for: &["Session data", "High-throughput lookups"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/dynamodb/",
                gcp: "https://cloud.google.com/firestore/docs",
                azure: "https://learn.microsoft.com/azure/cosmos-db/",
            },
        },
    ),
    (
        "cache",
        ServiceMetadata {
            desc: "In-memory cache in front of slower data stores.",
            how_it_works: "Hot keys live in RAM on managed Redis or Memcached nodes.",
            pros: &["Sub-millisecond reads", "Offloads the database"],
            cons: &["Data is volatile", "Invalidation is hard"],
            best_for: &["Sessions", "Leaderboards", "Rate limiting"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/elasticache/",
                gcp: "https://cloud.google.com/memorystore/docs",
                azure: "https://learn.microsoft.com/azure/azure-cache-for-redis/",
            },
        },
    ),
    (
        "object_storage",
        ServiceMetadata {
            desc: "Durable storage for files, media and backups.",
            how_it_works: "Objects are stored in buckets and replicated across availability zones.",
            pros: &["Virtually unlimited capacity", "Very high durability"],
            cons: &["Not a file system", "Egress charges"],
            best_for: &["User uploads", "Static assets", "Archives"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/s3/",
                gcp: "https://cloud.google.com/storage/docs",
                azure: "https://learn.microsoft.com/azure/storage/blobs/",
            },
        },
    ),
    (
        "block_storage",
        ServiceMetadata {
            desc: "Network-attached disks for virtual machines.",
            how_it_works: "Volumes attach to one instance at a time and can be snapshotted.",
            pros: &["Low latency", "Snapshots"],
            cons: &["Zonal", "Provisioned capacity"],
            best_for: &["Self-managed databases", "Boot volumes"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/ebs/",
                gcp: "https://cloud.google.com/compute/docs/disks",
                azure: "https://learn.microsoft.com/azure/virtual-machines/managed-disks-overview",
            },
        },
    ),
    (
        "cdn",
        ServiceMetadata {
            desc: "Content delivery network caching responses at the edge.",
            how_it_works: "Edge locations serve cached content and forward misses to the origin.",
            pros: &["Lower latency worldwide", "Absorbs traffic spikes"],
            cons: &["Cache invalidation delays"],
            best_for: &["Static sites", "Media delivery"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/cloudfront/",
                gcp: "https://cloud.google.com/cdn/docs",
                azure: "https://learn.microsoft.com/azure/frontdoor/",
            },
        },
    ),
    (
        "load_balancer",
        ServiceMetadata {
            desc: "Distributes incoming traffic across healthy backends.",
            how_it_works: "Health checks remove failing targets; TLS can terminate at the balancer.",
            pros: &["High availability", "TLS offload"],
            cons: &["Hourly baseline cost"],
            best_for: &["Web tiers", "Blue/green deploys"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/elasticloadbalancing/",
                gcp: "https://cloud.google.com/load-balancing/docs",
                azure: "https://learn.microsoft.com/azure/load-balancer/",
            },
        },
    ),
    (
        "api_gateway",
        ServiceMetadata {
            desc: "Managed entry point for HTTP APIs.",
            how_it_works: "Routes requests to backends with throttling, auth and request validation.",
            pros: &["Built-in throttling", "Per-request pricing"],
            cons: &["Payload and timeout limits"],
            best_for: &["Public APIs", "Serverless backends"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/apigateway/",
                gcp: "https://cloud.google.com/api-gateway/docs",
                azure: "https://learn.microsoft.com/azure/api-management/",
            },
        },
    ),
    (
        "dns",
        ServiceMetadata {
            desc: "Authoritative DNS for your domains.",
            how_it_works: "Hosted zones answer queries from a global anycast network.",
            pros: &["High availability", "Health-checked routing"],
            cons: &["Propagation delays"],
            best_for: &["Custom domains", "Failover routing"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/route53/",
                gcp: "https://cloud.google.com/dns/docs",
                azure: "https://learn.microsoft.com/azure/dns/",
            },
        },
    ),
    (
        "message_queue",
        ServiceMetadata {
            desc: "Durable queue decoupling producers from consumers.",
            how_it_works: "Messages wait in the queue until a worker receives and acknowledges them.",
            pros: &["Smooths load spikes", "Retries for free"],
            cons: &["At-least-once delivery", "Ordering needs care"],
            best_for: &["Background jobs", "Order processing"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/sqs/",
                gcp: "https://cloud.google.com/pubsub/docs",
                azure: "https://learn.microsoft.com/azure/service-bus-messaging/",
            },
        },
    ),
    (
        "event_bus",
        ServiceMetadata {
            desc: "Routes events between services by rule.",
            how_it_works: "Producers publish events; rules match patterns and fan out to targets.",
            pros: &["Loose coupling", "Schema discovery"],
            cons: &["Harder to trace end to end"],
            best_for: &["Event-driven systems", "SaaS integrations"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/eventbridge/",
                gcp: "https://cloud.google.com/eventarc/docs",
                azure: "https://learn.microsoft.com/azure/event-grid/",
            },
        },
    ),
    (
        "identity",
        ServiceMetadata {
            desc: "User sign-up, sign-in and token issuance.",
            how_it_works: "Hosted user pools issue OIDC tokens that your APIs verify.",
            pros: &["Social and enterprise login", "MFA built in"],
            cons: &["Migration away is painful"],
            best_for: &["Consumer apps", "B2B SSO"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/cognito/",
                gcp: "https://cloud.google.com/identity-platform/docs",
                azure: "https://learn.microsoft.com/azure/active-directory-b2c/",
            },
        },
    ),
    (
        "secrets_manager",
        ServiceMetadata {
            desc: "Encrypted storage and rotation for credentials.",
            how_it_works: "Applications fetch secrets at runtime using their workload identity.",
            pros: &["Automatic rotation", "Audit trail"],
            cons: &["Per-secret pricing"],
            best_for: &["Database passwords", "API keys"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/secretsmanager/",
                gcp: "https://cloud.google.com/secret-manager/docs",
                azure: "https://learn.microsoft.com/azure/key-vault/",
            },
        },
    ),
    (
        "waf",
        ServiceMetadata {
            desc: "Web application firewall filtering malicious requests.",
            how_it_works: "Managed rule sets inspect HTTP traffic in front of your load balancer or CDN.",
            pros: &["Blocks common exploits", "Rate-based rules"],
            cons: &["False positives need tuning"],
            best_for: &["Public web apps", "Compliance"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/waf/",
                gcp: "https://cloud.google.com/armor/docs",
                azure: "https://learn.microsoft.com/azure/web-application-firewall/",
            },
        },
    ),
    (
        "vpc",
        ServiceMetadata {
            desc: "Private network isolating your resources.",
            how_it_works: "Subnets, route tables and security groups control traffic between tiers.",
            pros: &["Network isolation", "Fine-grained rules"],
            cons: &["NAT gateway costs"],
            best_for: &["Every production workload"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/vpc/",
                gcp: "https://cloud.google.com/vpc/docs",
                azure: "https://learn.microsoft.com/azure/virtual-network/",
            },
        },
    ),
    (
        "monitoring",
        ServiceMetadata {
            desc: "Metrics, dashboards and alerting.",
            how_it_works: "Services emit metrics that feed dashboards and alarm thresholds.",
            pros: &["Native integration", "Alert routing"],
            cons: &["Custom metrics add cost"],
            best_for: &["SLO tracking", "On-call alerting"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/cloudwatch/",
                gcp: "https://cloud.google.com/monitoring/docs",
                azure: "https://learn.microsoft.com/azure/azure-monitor/",
            },
        },
    ),
    (
        "logging",
        ServiceMetadata {
            desc: "Centralised log collection and search.",
            how_it_works: "Agents ship structured logs into indexed, retention-managed storage.",
            pros: &["Single place to search", "Retention policies"],
            cons: &["Ingestion pricing"],
            best_for: &["Debugging", "Audit"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/AmazonCloudWatch/latest/logs/",
                gcp: "https://cloud.google.com/logging/docs",
                azure: "https://learn.microsoft.com/azure/azure-monitor/logs/",
            },
        },
    ),
    (
        "data_warehouse",
        ServiceMetadata {
            desc: "Columnar warehouse for analytical queries.",
            how_it_works: "Data is loaded in batches and queried with massively parallel SQL.",
            pros: &["Fast aggregations", "Separates storage and compute"],
            cons: &["Not for transactional workloads"],
            best_for: &["BI dashboards", "Data science"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/redshift/",
                gcp: "https://cloud.google.com/bigquery/docs",
                azure: "https://learn.microsoft.com/azure/synapse-analytics/",
            },
        },
    ),
    (
        "search",
        ServiceMetadata {
            desc: "Managed full-text search cluster.",
            how_it_works: "Documents are indexed into shards that answer relevance-ranked queries.",
            pros: &["Full-text relevance", "Faceting"],
            cons: &["Cluster sizing", "Reindexing cost"],
            best_for: &["Product search", "Log analytics"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/opensearch-service/",
                gcp: "https://cloud.google.com/vertex-ai-search-and-conversation",
                azure: "https://learn.microsoft.com/azure/search/",
            },
        },
    ),
    (
        "ml_platform",
        ServiceMetadata {
            desc: "Managed training and inference for machine learning models.",
            how_it_works: "Training jobs run on managed accelerators and deploy to autoscaling endpoints.",
            pros: &["Managed GPUs", "Experiment tracking"],
            cons: &["Accelerator pricing"],
            best_for: &["Recommendation", "LLM inference"],
            links: ProviderLinks {
                aws: "https://docs.aws.amazon.com/sagemaker/",
                gcp: "https://cloud.google.com/vertex-ai/docs",
                azure: "https://learn.microsoft.com/azure/machine-learning/",
            },
        },
    ),
];

static ALIASES: &[(&str, &str)] = &[
    ("ec2", "compute"),
    ("vm", "compute"),
    ("virtual_machine", "compute"),
    ("compute_engine", "compute"),
    ("app_server", "compute"),
    ("kubernetes", "container_orchestration"),
    ("k8s", "container_orchestration"),
    ("eks", "container_orchestration"),
    ("gke", "container_orchestration"),
    ("aks", "container_orchestration"),
    ("fargate", "container_service"),
    ("ecs", "container_service"),
    ("cloud_run", "container_service"),
    ("container_apps", "container_service"),
    ("lambda", "serverless_compute"),
    ("cloud_functions", "serverless_compute"),
    ("azure_functions", "serverless_compute"),
    ("functions", "serverless_compute"),
    ("postgres", "relational_database"),
    ("postgresql", "relational_database"),
    ("mysql", "relational_database"),
    ("rds", "relational_database"),
    ("aurora", "relational_database"),
    ("cloud_sql", "relational_database"),
    ("azure_sql", "relational_database"),
    ("database", "relational_database"),
    ("dynamodb", "nosql_database"),
    ("firestore", "nosql_database"),
    ("cosmos_db", "nosql_database"),
    ("cosmosdb", "nosql_database"),
    ("mongodb", "nosql_database"),
    ("redis", "cache"),
    ("memcached", "cache"),
    ("elasticache", "cache"),
    ("memorystore", "cache"),
    ("s3", "object_storage"),
    ("gcs", "object_storage"),
    ("cloud_storage", "object_storage"),
    ("blob_storage", "object_storage"),
    ("storage", "object_storage"),
    ("ebs", "block_storage"),
    ("persistent_disk", "block_storage"),
    ("managed_disk", "block_storage"),
    ("cloudfront", "cdn"),
    ("cloud_cdn", "cdn"),
    ("front_door", "cdn"),
    ("alb", "load_balancer"),
    ("elb", "load_balancer"),
    ("nlb", "load_balancer"),
    ("apigateway", "api_gateway"),
    ("api_management", "api_gateway"),
    ("route53", "dns"),
    ("route_53", "dns"),
    ("cloud_dns", "dns"),
    ("sqs", "message_queue"),
    ("pubsub", "message_queue"),
    ("pub_sub", "message_queue"),
    ("service_bus", "message_queue"),
    ("queue", "message_queue"),
    ("eventbridge", "event_bus"),
    ("eventarc", "event_bus"),
    ("event_grid", "event_bus"),
    ("cognito", "identity"),
    ("auth", "identity"),
    ("authentication", "identity"),
    ("identity_platform", "identity"),
    ("ad_b2c", "identity"),
    ("key_vault", "secrets_manager"),
    ("secret_manager", "secrets_manager"),
    ("secrets", "secrets_manager"),
    ("cloud_armor", "waf"),
    ("firewall", "waf"),
    ("network", "vpc"),
    ("virtual_network", "vpc"),
    ("vnet", "vpc"),
    ("cloudwatch", "monitoring"),
    ("azure_monitor", "monitoring"),
    ("cloud_monitoring", "monitoring"),
    ("observability", "monitoring"),
    ("cloud_logging", "logging"),
    ("logs", "logging"),
    ("redshift", "data_warehouse"),
    ("bigquery", "data_warehouse"),
    ("synapse", "data_warehouse"),
    ("opensearch", "search"),
    ("elasticsearch", "search"),
    ("cognitive_search", "search"),
    ("sagemaker", "ml_platform"),
    ("vertex_ai", "ml_platform"),
    ("azure_ml", "ml_platform"),
];

// Checked in order; the first needle found anywhere in the name wins.
const SHORT_NEEDLE_LEN: usize = 3;

static HEURISTICS: &[(&[&str], &str)] = &[
    (&["nosql", "document", "dynamo", "cosmos", "mongo"], "nosql_database"),
    (&["warehouse", "analytics", "bigquery"], "data_warehouse"),
    (&["sql", "db", "database", "postgres", "mysql"], "relational_database"),
    (&["cache", "redis"], "cache"),
    (&["queue", "pubsub", "kafka", "stream"], "message_queue"),
    (&["event"], "event_bus"),
    (&["bucket", "blob", "storage", "s3"], "object_storage"),
    (&["disk", "volume"], "block_storage"),
    (&["cdn", "edge"], "cdn"),
    (&["balancer", "lb"], "load_balancer"),
    (&["gateway", "api"], "api_gateway"),
    (&["dns", "domain"], "dns"),
    (&["auth", "login", "identity", "user_pool"], "identity"),
    (&["secret", "vault", "kms"], "secrets_manager"),
    (&["waf", "firewall", "armor"], "waf"),
    (&["vpc", "network", "subnet"], "vpc"),
    (&["monitor", "metric", "alert"], "monitoring"),
    (&["log"], "logging"),
    (&["search"], "search"),
    (&["lambda", "function", "serverless"], "serverless_compute"),
    (&["kube", "k8s", "cluster"], "container_orchestration"),
    (&["container", "docker"], "container_service"),
    (&["ml", "model", "ai", "inference"], "ml_platform"),
    (&["compute", "server", "instance", "vm", "backend"], "compute"),
];

fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut pending_separator = false;
    for ch in name.trim().chars() {
        if ch.is_whitespace() || ch == '-' || ch == '_' || ch == '/' {
            pending_separator = !normalized.is_empty();
            continue;
        }
        if pending_separator {
            normalized.push('_');
            pending_separator = false;
        }
        normalized.extend(ch.to_lowercase());
    }
    normalized
}

fn lookup_canonical(id: &str) -> Option<(&'static str, &'static ServiceMetadata)> {
    SERVICES
        .iter()
        .find(|(key, _)| *key == id)
        .map(|(key, metadata)| (*key, metadata))
}

/// Resolves a free-text service name to its canonical identifier without
/// falling back to the generic record.
pub fn canonical_service_id(name: &str) -> Option<&'static str> {
    let normalized = normalize_name(name);
    if normalized.is_empty() {
        return None;
    }

    if let Some((key, _)) = lookup_canonical(&normalized) {
        return Some(key);
    }

    if let Some((_, target)) = ALIASES.iter().find(|(alias, _)| *alias == normalized) {
        return Some(target);
    }

    HEURISTICS
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| matches_needle(&normalized, needle)))
        .map(|(_, target)| *target)
}

/// Needles of three characters or fewer must match a whole `_`-separated
/// token (or its plural); longer needles match anywhere.
fn matches_needle(normalized: &str, needle: &str) -> bool {
    if needle.len() > SHORT_NEEDLE_LEN {
        return normalized.contains(needle);
    }
    normalized
        .split('_')
        .any(|token| token == needle || token.strip_suffix('s') == Some(needle))
}

/// Returns descriptive metadata for any service name.
pub fn get_service_metadata(name: &str) -> &'static ServiceMetadata {
    match canonical_service_id(name).and_then(lookup_canonical) {
        Some((_, metadata)) => metadata,
        None => {
            log::debug!(name = name; "no metadata match, using generic record");
            &GENERIC_SERVICE
        }
    }
}

pub fn known_services() -> impl Iterator<Item = &'static str> {
    SERVICES.iter().map(|(key, _)| *key)
}
