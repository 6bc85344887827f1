pub mod convert;
pub mod mask;

pub mod protowire {
    tonic::include_proto!("swh.provenance");
}
