//! AuthorizationPolicies for the bookinfo HTTP authorization scenario.
//!
//! Principals name the bookinfo service accounts, so these only make sense
//! applied to [`crate::APP_NAMESPACE`].

use super::PolicyArtifact;

/// Empty-spec policy: denies every request to every workload in the namespace
pub const DENY_ALL: PolicyArtifact = PolicyArtifact::new(
    "deny-all",
    r#"apiVersion: security.istio.io/v1beta1
kind: AuthorizationPolicy
metadata:
  name: deny-all
spec:
  {}
"#,
);

/// Allows GET on productpage from anyone
pub const PRODUCTPAGE_GET: PolicyArtifact = PolicyArtifact::new(
    "productpage-get",
    r#"apiVersion: security.istio.io/v1beta1
kind: AuthorizationPolicy
metadata:
  name: productpage-viewer
spec:
  selector:
    matchLabels:
      app: productpage
  action: ALLOW
  rules:
  - to:
    - operation:
        methods: ["GET"]
"#,
);

/// Allows GET on details from the productpage service account
pub const DETAILS_GET: PolicyArtifact = PolicyArtifact::new(
    "details-get",
    r#"apiVersion: security.istio.io/v1beta1
kind: AuthorizationPolicy
metadata:
  name: details-viewer
spec:
  selector:
    matchLabels:
      app: details
  action: ALLOW
  rules:
  - from:
    - source:
        principals: ["cluster.local/ns/bookinfo/sa/bookinfo-productpage"]
    to:
    - operation:
        methods: ["GET"]
"#,
);

/// Allows GET on reviews from the productpage service account
pub const REVIEWS_GET: PolicyArtifact = PolicyArtifact::new(
    "reviews-get",
    r#"apiVersion: security.istio.io/v1beta1
kind: AuthorizationPolicy
metadata:
  name: reviews-viewer
spec:
  selector:
    matchLabels:
      app: reviews
  action: ALLOW
  rules:
  - from:
    - source:
        principals: ["cluster.local/ns/bookinfo/sa/bookinfo-productpage"]
    to:
    - operation:
        methods: ["GET"]
"#,
);

/// Allows GET on ratings from the reviews service account
pub const RATINGS_GET: PolicyArtifact = PolicyArtifact::new(
    "ratings-get",
    r#"apiVersion: security.istio.io/v1beta1
kind: AuthorizationPolicy
metadata:
  name: ratings-viewer
spec:
  selector:
    matchLabels:
      app: ratings
  action: ALLOW
  rules:
  - from:
    - source:
        principals: ["cluster.local/ns/bookinfo/sa/bookinfo-reviews"]
    to:
    - operation:
        methods: ["GET"]
"#,
);

/// Every authorization artifact, in apply order
pub const ALL: &[PolicyArtifact] = &[
    DENY_ALL,
    PRODUCTPAGE_GET,
    DETAILS_GET,
    REVIEWS_GET,
    RATINGS_GET,
];
