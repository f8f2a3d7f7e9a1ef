mod mdat;
mod mfhd;
mod moof;
mod sidx;
mod styp;
mod tfdt;
mod tfhd;
mod traf;
mod trex;
mod trun;

pub use self::{
    mdat::*, mfhd::*, moof::*, sidx::*, styp::*, tfdt::*, tfhd::*, traf::*, trex::*, trun::*,
};
