pub mod rig_bundle;
