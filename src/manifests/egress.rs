//! Egress routing artifacts: service entries, egress gateway routing and
//! TLS/mTLS origination for edition.cnn.com and the in-cluster nginx.

use serde_json::{json, Value};

use super::PolicyArtifact;

/// External host every egress probe targets
pub const CNN_HOST: &str = "edition.cnn.com";

/// In-cluster nginx host used for mTLS origination
pub const NGINX_HOST: &str = "my-nginx.bookinfo.svc.cluster.local";

/// Secret volume holding the egress gateway's client certificate
pub const CLIENT_CERTS_SECRET: &str = "nginx-client-certs";

/// Secret volume holding the CA that signed the nginx server certificate
pub const CA_CERTS_SECRET: &str = "nginx-ca-certs";

/// Where the egress gateway sees its client certificate
pub const CLIENT_CERTS_MOUNT: &str = "/etc/istio/nginx-client-certs";

/// Where the egress gateway sees the nginx CA
pub const CA_CERTS_MOUNT: &str = "/etc/istio/nginx-ca-certs";

/// ServiceEntry for edition.cnn.com on HTTP 80 and HTTPS 443
pub const CNN_SERVICE_ENTRY: PolicyArtifact = PolicyArtifact::new(
    "cnn-service-entry",
    r#"apiVersion: networking.istio.io/v1alpha3
kind: ServiceEntry
metadata:
  name: cnn
spec:
  hosts:
  - edition.cnn.com
  ports:
  - number: 80
    name: http-port
    protocol: HTTP
  - number: 443
    name: https
    protocol: HTTPS
  resolution: DNS
"#,
);

/// ServiceEntry for edition.cnn.com on 443 as opaque TLS
pub const CNN_SERVICE_ENTRY_TLS: PolicyArtifact = PolicyArtifact::new(
    "cnn-service-entry-tls",
    r#"apiVersion: networking.istio.io/v1alpha3
kind: ServiceEntry
metadata:
  name: cnn
spec:
  hosts:
  - edition.cnn.com
  ports:
  - number: 443
    name: tls
    protocol: TLS
  resolution: DNS
"#,
);

/// Routes plain HTTP to edition.cnn.com through the egress gateway
pub const CNN_GATEWAY: PolicyArtifact = PolicyArtifact::new(
    "cnn-gateway",
    r#"apiVersion: networking.istio.io/v1alpha3
kind: Gateway
metadata:
  name: istio-egressgateway
spec:
  selector:
    istio: egressgateway
  servers:
  - port:
      number: 80
      name: http
      protocol: HTTP
    hosts:
    - edition.cnn.com
---
apiVersion: networking.istio.io/v1alpha3
kind: DestinationRule
metadata:
  name: egressgateway-for-cnn
spec:
  host: istio-egressgateway.istio-system.svc.cluster.local
  subsets:
  - name: cnn
---
apiVersion: networking.istio.io/v1alpha3
kind: VirtualService
metadata:
  name: direct-cnn-through-egress-gateway
spec:
  hosts:
  - edition.cnn.com
  gateways:
  - istio-egressgateway
  - mesh
  http:
  - match:
    - gateways:
      - mesh
      port: 80
    route:
    - destination:
        host: istio-egressgateway.istio-system.svc.cluster.local
        subset: cnn
        port:
          number: 80
      weight: 100
  - match:
    - gateways:
      - istio-egressgateway
      port: 80
    route:
    - destination:
        host: edition.cnn.com
        port:
          number: 80
      weight: 100
"#,
);

/// Routes TLS to edition.cnn.com through the egress gateway in passthrough mode
pub const CNN_GATEWAY_HTTPS: PolicyArtifact = PolicyArtifact::new(
    "cnn-gateway-https",
    r#"apiVersion: networking.istio.io/v1alpha3
kind: Gateway
metadata:
  name: istio-egressgateway
spec:
  selector:
    istio: egressgateway
  servers:
  - port:
      number: 443
      name: tls
      protocol: TLS
    hosts:
    - edition.cnn.com
    tls:
      mode: PASSTHROUGH
---
apiVersion: networking.istio.io/v1alpha3
kind: DestinationRule
metadata:
  name: egressgateway-for-cnn
spec:
  host: istio-egressgateway.istio-system.svc.cluster.local
  subsets:
  - name: cnn
---
apiVersion: networking.istio.io/v1alpha3
kind: VirtualService
metadata:
  name: direct-cnn-through-egress-gateway
spec:
  hosts:
  - edition.cnn.com
  gateways:
  - mesh
  - istio-egressgateway
  tls:
  - match:
    - gateways:
      - mesh
      port: 443
      sniHosts:
      - edition.cnn.com
    route:
    - destination:
        host: istio-egressgateway.istio-system.svc.cluster.local
        subset: cnn
        port:
          number: 443
  - match:
    - gateways:
      - istio-egressgateway
      port: 443
      sniHosts:
      - edition.cnn.com
    route:
    - destination:
        host: edition.cnn.com
        port:
          number: 443
      weight: 100
"#,
);

/// Plain HTTP from the mesh, TLS originated at the egress gateway
pub const CNN_GATEWAY_TLS_FILE: PolicyArtifact = PolicyArtifact::new(
    "cnn-gateway-tls-file",
    r#"apiVersion: networking.istio.io/v1alpha3
kind: Gateway
metadata:
  name: istio-egressgateway
spec:
  selector:
    istio: egressgateway
  servers:
  - port:
      number: 80
      name: http-port-for-tls-origination
      protocol: HTTP
    hosts:
    - edition.cnn.com
---
apiVersion: networking.istio.io/v1alpha3
kind: DestinationRule
metadata:
  name: egressgateway-for-cnn
spec:
  host: istio-egressgateway.istio-system.svc.cluster.local
  subsets:
  - name: cnn
---
apiVersion: networking.istio.io/v1alpha3
kind: VirtualService
metadata:
  name: direct-cnn-through-egress-gateway
spec:
  hosts:
  - edition.cnn.com
  gateways:
  - istio-egressgateway
  - mesh
  http:
  - match:
    - gateways:
      - mesh
      port: 80
    route:
    - destination:
        host: istio-egressgateway.istio-system.svc.cluster.local
        subset: cnn
        port:
          number: 80
      weight: 100
  - match:
    - gateways:
      - istio-egressgateway
      port: 80
    route:
    - destination:
        host: edition.cnn.com
        port:
          number: 443
      weight: 100
---
apiVersion: networking.istio.io/v1alpha3
kind: DestinationRule
metadata:
  name: originate-tls-for-edition-cnn-com
spec:
  host: edition.cnn.com
  trafficPolicy:
    loadBalancer:
      simple: ROUND_ROBIN
    portLevelSettings:
    - port:
        number: 443
      tls:
        mode: SIMPLE
"#,
);

/// Routes mesh traffic for my-nginx through the egress gateway over ISTIO_MUTUAL
pub const NGINX_GATEWAY_TLS: PolicyArtifact = PolicyArtifact::new(
    "nginx-gateway-tls",
    r#"apiVersion: networking.istio.io/v1alpha3
kind: Gateway
metadata:
  name: istio-egressgateway
spec:
  selector:
    istio: egressgateway
  servers:
  - port:
      number: 443
      name: https
      protocol: HTTPS
    hosts:
    - my-nginx.bookinfo.svc.cluster.local
    tls:
      mode: ISTIO_MUTUAL
---
apiVersion: networking.istio.io/v1alpha3
kind: DestinationRule
metadata:
  name: egressgateway-for-nginx
spec:
  host: istio-egressgateway.istio-system.svc.cluster.local
  subsets:
  - name: nginx
    trafficPolicy:
      loadBalancer:
        simple: ROUND_ROBIN
      portLevelSettings:
      - port:
          number: 443
        tls:
          mode: ISTIO_MUTUAL
          sni: my-nginx.bookinfo.svc.cluster.local
---
apiVersion: networking.istio.io/v1alpha3
kind: VirtualService
metadata:
  name: direct-nginx-through-egress-gateway
spec:
  hosts:
  - my-nginx.bookinfo.svc.cluster.local
  gateways:
  - istio-egressgateway
  - mesh
  http:
  - match:
    - gateways:
      - mesh
      port: 80
    route:
    - destination:
        host: istio-egressgateway.istio-system.svc.cluster.local
        subset: nginx
        port:
          number: 443
      weight: 100
  - match:
    - gateways:
      - istio-egressgateway
      port: 443
    route:
    - destination:
        host: my-nginx.bookinfo.svc.cluster.local
        port:
          number: 443
      weight: 100
"#,
);

/// Originates mutual TLS to my-nginx with the file-mounted client certificate.
/// Applied in the control plane namespace next to the egress gateway.
pub const NGINX_MESH_RULE: PolicyArtifact = PolicyArtifact::new(
    "nginx-mesh-rule",
    r#"apiVersion: networking.istio.io/v1alpha3
kind: DestinationRule
metadata:
  name: originate-mtls-for-nginx
spec:
  host: my-nginx.bookinfo.svc.cluster.local
  trafficPolicy:
    loadBalancer:
      simple: ROUND_ROBIN
    portLevelSettings:
    - port:
        number: 443
      tls:
        mode: MUTUAL
        clientCertificate: /etc/istio/nginx-client-certs/tls.crt
        privateKey: /etc/istio/nginx-client-certs/tls.key
        caCertificates: /etc/istio/nginx-ca-certs/example.com.crt
        sni: my-nginx.bookinfo.svc.cluster.local
"#,
);

/// nginx Service and Deployment serving TLS on 443 with client verification
pub const NGINX_SERVER: PolicyArtifact = PolicyArtifact::new(
    "nginx-server",
    r#"apiVersion: v1
kind: Service
metadata:
  name: my-nginx
  labels:
    run: my-nginx
spec:
  ports:
  - port: 443
    protocol: TCP
  selector:
    run: my-nginx
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: my-nginx
spec:
  selector:
    matchLabels:
      run: my-nginx
  replicas: 1
  template:
    metadata:
      labels:
        run: my-nginx
      annotations:
        sidecar.istio.io/inject: "false"
    spec:
      containers:
      - name: my-nginx
        image: nginx
        ports:
        - containerPort: 443
        volumeMounts:
        - name: nginx-config
          mountPath: /etc/nginx
          readOnly: true
        - name: nginx-server-certs
          mountPath: /etc/nginx-server-certs
          readOnly: true
        - name: nginx-ca-certs
          mountPath: /etc/nginx-ca-certs
          readOnly: true
      volumes:
      - name: nginx-config
        configMap:
          name: nginx-configmap
      - name: nginx-server-certs
        secret:
          secretName: nginx-server-certs
      - name: nginx-ca-certs
        secret:
          secretName: nginx-ca-certs
"#,
);

/// Every egress artifact
pub const ALL: &[PolicyArtifact] = &[
    CNN_SERVICE_ENTRY,
    CNN_SERVICE_ENTRY_TLS,
    CNN_GATEWAY,
    CNN_GATEWAY_HTTPS,
    CNN_GATEWAY_TLS_FILE,
    NGINX_GATEWAY_TLS,
    NGINX_MESH_RULE,
    NGINX_SERVER,
];

fn secret_volume(name: &str) -> Value {
    json!({
        "name": name,
        "secret": { "secretName": name, "optional": true }
    })
}

fn volume_mount(name: &str, path: &str) -> Value {
    json!({ "mountPath": path, "name": name, "readOnly": true })
}

/// JSON patch mounting the client and CA certificate secrets into the
/// egress gateway's first container.
pub fn egress_gateway_cert_patch() -> Value {
    json!([
        {
            "op": "add",
            "path": "/spec/template/spec/containers/0/volumeMounts/0",
            "value": volume_mount(CLIENT_CERTS_SECRET, CLIENT_CERTS_MOUNT),
        },
        {
            "op": "add",
            "path": "/spec/template/spec/volumes/0",
            "value": secret_volume(CLIENT_CERTS_SECRET),
        },
        {
            "op": "add",
            "path": "/spec/template/spec/containers/0/volumeMounts/1",
            "value": volume_mount(CA_CERTS_SECRET, CA_CERTS_MOUNT),
        },
        {
            "op": "add",
            "path": "/spec/template/spec/volumes/1",
            "value": secret_volume(CA_CERTS_SECRET),
        },
    ])
}
