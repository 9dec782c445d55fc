//! Per-format line-to-record converters.

mod apache;
mod docker;
mod generic;
mod http;
mod json;
mod kubernetes;
mod nginx;
mod python;
mod syslog;

pub use apache::{ApacheCombinedParser, ApacheCommonParser};
pub use docker::{DockerDaemonParser, DockerJsonParser};
pub use generic::GenericParser;
pub use json::JsonParser;
pub use kubernetes::{
    KubernetesAuditParser, KubernetesComponentParser, KubernetesContainerParser,
    KubernetesEventParser,
};
pub use nginx::{NginxAccessParser, NginxErrorParser};
pub use python::PythonLoggingParser;
pub use syslog::{Syslog3164Parser, Syslog5424Parser};

use crate::parser::LogParser;

/// All builtin parsers, in registration order.
pub fn builtin_parsers() -> Vec<Box<dyn LogParser>> {
    vec![
        Box::new(JsonParser),
        Box::new(ApacheCommonParser),
        Box::new(ApacheCombinedParser),
        Box::new(NginxAccessParser),
        Box::new(NginxErrorParser),
        Box::new(Syslog3164Parser),
        Box::new(Syslog5424Parser),
        Box::new(PythonLoggingParser),
        Box::new(GenericParser),
        Box::new(DockerJsonParser),
        Box::new(DockerDaemonParser),
        Box::new(KubernetesContainerParser::new()),
        Box::new(KubernetesComponentParser),
        Box::new(KubernetesAuditParser),
        Box::new(KubernetesEventParser),
    ]
}
