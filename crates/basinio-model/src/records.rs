//! Project-level auxiliary tables.
//!
//! Each table is a flat list of fixed-size records serialized as one packed
//! little-endian blob. The XML index stores the element name, the record
//! count and the record size next to the blob descriptor; a size mismatch
//! on import is a format error.

use basinio_store::{decode_records, encode_records, put_fixed_str, FixedRecord, RecordCursor};
use basinio_types::{BasinError, BasinResult};
use serde::Serialize;

/// One encodable record field.
trait Field: Sized {
    const WIDTH: usize;
    fn put(&self, out: &mut Vec<u8>);
    fn take(cursor: &mut RecordCursor<'_>) -> BasinResult<Self>;
}

impl Field for f32 {
    const WIDTH: usize = 4;
    fn put(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
    fn take(cursor: &mut RecordCursor<'_>) -> BasinResult<Self> {
        cursor.f32()
    }
}

impl Field for f64 {
    const WIDTH: usize = 8;
    fn put(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
    fn take(cursor: &mut RecordCursor<'_>) -> BasinResult<Self> {
        cursor.f64()
    }
}

impl Field for i32 {
    const WIDTH: usize = 4;
    fn put(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
    fn take(cursor: &mut RecordCursor<'_>) -> BasinResult<Self> {
        cursor.i32()
    }
}

impl Field for bool {
    const WIDTH: usize = 1;
    fn put(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }
    fn take(cursor: &mut RecordCursor<'_>) -> BasinResult<Self> {
        cursor.bool()
    }
}

/// Fixed-width text field of `N` bytes; longer values are truncated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Name<const N: usize>(pub String);

impl<const N: usize> From<&str> for Name<N> {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl<const N: usize> Field for Name<N> {
    const WIDTH: usize = N;
    fn put(&self, out: &mut Vec<u8>) {
        put_fixed_str(out, &self.0, N);
    }
    fn take(cursor: &mut RecordCursor<'_>) -> BasinResult<Self> {
        cursor.fixed_str(N).map(Self)
    }
}

type Label = Name<64>;

macro_rules! fixed_record {
    ($(#[$meta:meta])* $name:ident { $($field:ident: $ty:ty),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Serialize)]
        pub struct $name {
            $(pub $field: $ty,)*
        }

        impl FixedRecord for $name {
            const SIZE: usize = 0 $(+ <$ty as Field>::WIDTH)*;

            fn encode(&self, out: &mut Vec<u8>) {
                $(Field::put(&self.$field, out);)*
            }

            fn decode(cursor: &mut RecordCursor<'_>) -> BasinResult<Self> {
                Ok(Self {
                    $($field: <$ty as Field>::take(cursor)?,)*
                })
            }
        }
    };
}

fixed_record!(
    /// A hydrocarbon migration step between two traps or a source and a trap.
    MigrationEvent {
        migration_process: Label,
        source_age: f32,
        source_rock_name: Label,
        source_reservoir_name: Label,
        source_trap_id: i32,
        source_point_x: f32,
        source_point_y: f32,
        destination_age: f32,
        destination_reservoir_name: Label,
        destination_trap_id: i32,
        destination_point_x: f32,
        destination_point_y: f32,
        mass_c1: f64,
        mass_c2: f64,
        mass_c3: f64,
        mass_c4: f64,
        mass_c5: f64,
        mass_n2: f64,
        mass_cox: f64,
        mass_h2s: f64,
        mass_c6_14_aro: f64,
        mass_c6_14_sat: f64,
    }
);

fixed_record!(
    /// Trapper properties as tabulated across all snapshots.
    TrapperRecord {
        reservoir_name: Label,
        age: f32,
        id: i32,
        persistent_id: i32,
        downstream_persistent_id: i32,
        depth: f32,
        spill_depth: f32,
        pos_x: f32,
        pos_y: f32,
        spill_pos_x: f32,
        spill_pos_y: f32,
        goc: f32,
        owc: f32,
        trap_capacity: f32,
        mass_liquid: f32,
        mass_vapour: f32,
        volume_oil: f32,
        volume_gas: f32,
        pressure: f32,
        temperature: f32,
        porosity: f32,
        permeability: f32,
        seal_permeability: f32,
        net_to_gross: f32,
    }
);

fixed_record!(
    /// A trap as reported by the migration simulator.
    TrapRecord {
        reservoir_name: Label,
        age: f32,
        id: i32,
        depth: f32,
        spill_depth: f32,
        pos_x: f32,
        pos_y: f32,
        spill_pos_x: f32,
        spill_pos_y: f32,
        goc: f32,
        owc: f32,
        trap_capacity: f32,
        fracture_pressure: f32,
        fract_seal_strength: f32,
        wc_surface: f32,
        pressure: f32,
        temperature: f32,
        permeability: f32,
        seal_permeability: f32,
        net_to_gross: f32,
    }
);

fixed_record!(
    DisplayContour {
        property_name: Label,
        contour_value: f32,
        contour_colour: Name<16>,
    }
);

fixed_record!(
    /// One contour of a temperature or vitrinite-reflectance iso-surface.
    IsoEntry {
        contour_value: f32,
        age: f32,
        np: i32,
        sum: f64,
    }
);

fixed_record!(
    FtSample {
        sample_id: Label,
        depth_index: f32,
        zeta: f32,
        ustgl_track_density: f32,
        predicted_age: f32,
        pooled_age: f32,
        pooled_age_err: f32,
        age_chi2: f32,
        degree_of_freedom: i32,
        p_age_chi2: f32,
        corr_coeff: f32,
        variance_sqrt_ns: f32,
        variance_sqrt_ni: f32,
        ns_div_ni: f32,
        ns_div_ni_err: f32,
        mean_ratio: f32,
        mean_ratio_err: f32,
        central_age: f32,
        central_age_err: f32,
        mean_age: f32,
        mean_age_err: f32,
        length_chi2: f32,
        apatite_yield: Label,
    }
);

fixed_record!(
    FtGrain {
        sample_id: Label,
        grain_id: i32,
        spont_track_no: i32,
        induced_track_no: i32,
        cl_weight_perc: f32,
        grain_age: f32,
    }
);

fixed_record!(
    FtPredLengthCountsHist {
        hist_id: i32,
        sample_id: Label,
        cl_weight_perc: f32,
        bin_start: f32,
        bin_width: f32,
        bin_num: i32,
    }
);

fixed_record!(
    FtPredLengthCountsHistData {
        hist_id: i32,
        bin_index: i32,
        bin_count: f32,
    }
);

fixed_record!(
    FtClWeightPercBins {
        bin_start: f64,
        bin_width: f64,
    }
);

fixed_record!(
    /// A 1D property value at one node and time.
    TimeIo1D {
        time: f32,
        property_name: Label,
        formation_name: Label,
        surface_name: Label,
        node_index: i32,
        value: f32,
    }
);

/// Encoded form of one table, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedTable {
    pub name: &'static str,
    pub count: usize,
    pub record_size: usize,
    pub bytes: Vec<u8>,
}

macro_rules! record_tables {
    ($($field:ident: $record:ty => $xml:literal),* $(,)?) => {
        /// Every auxiliary table of a project.
        #[derive(Clone, Debug, Default, PartialEq, Serialize)]
        pub struct RecordTables {
            $(pub $field: Vec<$record>,)*
        }

        impl RecordTables {
            /// XML element names in serialization order.
            pub const NAMES: &'static [&'static str] = &[$($xml),*];

            /// Non-empty tables packed into byte images.
            pub fn encode(&self) -> Vec<EncodedTable> {
                let mut out = Vec::new();
                $(
                    if !self.$field.is_empty() {
                        out.push(EncodedTable {
                            name: $xml,
                            count: self.$field.len(),
                            record_size: <$record as FixedRecord>::SIZE,
                            bytes: encode_records(&self.$field),
                        });
                    }
                )*
                out
            }

            /// Decode a stored table into its slot.
            pub fn decode(&mut self, name: &str, bytes: &[u8], count: usize, record_size: usize) -> BasinResult<()> {
                match name {
                    $($xml => self.$field = decode_records(bytes, count, record_size)?,)*
                    other => return Err(BasinError::Format(format!("unknown record table {other}"))),
                }
                Ok(())
            }

            /// Number of records per table, including empty ones.
            pub fn counts(&self) -> Vec<(&'static str, usize)> {
                vec![$(($xml, self.$field.len())),*]
            }
        }
    };
}

record_tables!(
    migration_events: MigrationEvent => "migrationEvents",
    trappers: TrapperRecord => "trapper",
    traps: TrapRecord => "trap",
    display_contours: DisplayContour => "displayContour",
    temperature_iso: IsoEntry => "temperatureIso",
    vr_iso: IsoEntry => "vrIso",
    ft_samples: FtSample => "ftSample",
    ft_grains: FtGrain => "ftGrain",
    ft_pred_length_counts_hist: FtPredLengthCountsHist => "ftPredLengthCountsHist",
    ft_pred_length_counts_hist_data: FtPredLengthCountsHistData => "ftPredLengthCountsHistData",
    ft_cl_weight_perc_bins: FtClWeightPercBins => "ftClWeightPercBins",
    time_io_1d: TimeIo1D => "timeIo1D",
);

impl RecordTables {
    pub fn is_empty(&self) -> bool {
        self.counts().iter().all(|(_, n)| *n == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes() {
        assert_eq!(IsoEntry::SIZE, 4 + 4 + 4 + 8);
        assert_eq!(DisplayContour::SIZE, 64 + 4 + 16);
        assert_eq!(FtClWeightPercBins::SIZE, 16);
    }

    #[test]
    fn tables_survive_encoding() {
        let mut tables = RecordTables::default();
        tables.migration_events.push(MigrationEvent {
            migration_process: "Expulsion".into(),
            source_age: 2.0,
            source_trap_id: 1205,
            mass_c1: 0.10101,
            ..Default::default()
        });
        tables.vr_iso.push(IsoEntry { contour_value: 0.7, age: 10.0, np: 3, sum: 12.5 });
        tables.time_io_1d.push(TimeIo1D {
            time: 5.0,
            property_name: "Temperature".into(),
            node_index: 4,
            value: 81.5,
            ..Default::default()
        });

        let encoded = tables.encode();
        assert_eq!(
            encoded.iter().map(|t| t.name).collect::<Vec<_>>(),
            vec!["migrationEvents", "vrIso", "timeIo1D"]
        );

        let mut back = RecordTables::default();
        for t in &encoded {
            back.decode(t.name, &t.bytes, t.count, t.record_size).unwrap();
        }
        assert_eq!(back, tables);
        assert!(!back.is_empty());
    }

    #[test]
    fn unknown_table_rejected() {
        let mut tables = RecordTables::default();
        assert!(matches!(tables.decode("biomarkers", &[], 0, 0), Err(BasinError::Format(_))));
        assert!(tables.decode("vrIso", &[0; 10], 1, 10).is_err());
    }

    #[test]
    fn long_names_truncate() {
        let long = "x".repeat(100);
        let row = DisplayContour { property_name: Name(long), contour_value: 1.0, contour_colour: "red".into() };
        let bytes = encode_records(std::slice::from_ref(&row));
        let back: Vec<DisplayContour> = decode_records(&bytes, 1, DisplayContour::SIZE).unwrap();
        assert_eq!(back[0].property_name.0.len(), 64);
        assert_eq!(back[0].contour_colour.0, "red");
    }
}
