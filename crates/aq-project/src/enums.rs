//! Public selector enums.
//!
//! Discriminants match the numeric codes the legacy facade and bindings
//! use; `try_from` rejects out-of-range codes with the dedicated error.

use crate::error::ProjectError;

macro_rules! selector {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(i32)]
        pub enum $name {
            $($variant = $value),+
        }

        impl TryFrom<i32> for $name {
            type Error = ProjectError;

            fn try_from(v: i32) -> Result<Self, ProjectError> {
                match v {
                    $($value => Ok($name::$variant),)+
                    _ => Err(ProjectError::CodeOutOfRange),
                }
            }
        }
    };
}

selector! {
    /// Node properties addressable through the value getters/setters.
    NodeProperty {
        Elevation = 0,
        BaseDemand = 1,
        DemandPattern = 2,
        Emitter = 3,
        InitQual = 4,
        SourceQual = 5,
        SourcePattern = 6,
        SourceType = 7,
        TankLevel = 8,
        Demand = 9,
        Head = 10,
        Pressure = 11,
        Quality = 12,
        SourceMass = 13,
        InitVolume = 14,
        MixModel = 15,
        MixZoneVol = 16,
        TankDiam = 17,
        MinVolume = 18,
        VolCurve = 19,
        MinLevel = 20,
        MaxLevel = 21,
        MixFraction = 22,
        TankKBulk = 23,
        TankVolume = 24,
        MaxVolume = 25,
    }
}

selector! {
    /// Link properties addressable through the value getters/setters.
    LinkProperty {
        Diameter = 0,
        Length = 1,
        Roughness = 2,
        MinorLoss = 3,
        InitStatus = 4,
        InitSetting = 5,
        KBulk = 6,
        KWall = 7,
        Flow = 8,
        Velocity = 9,
        Headloss = 10,
        Status = 11,
        Setting = 12,
        Energy = 13,
        LinkQual = 14,
        LinkPattern = 15,
        PumpHCurve = 19,
        PumpECurve = 20,
        PumpECost = 21,
        PumpEPattern = 22,
    }
}

selector! {
    /// Global analysis options.
    OptionParam {
        Trials = 0,
        Accuracy = 1,
        Tolerance = 2,
        EmitExponent = 3,
        DemandMult = 4,
        HeadError = 5,
        FlowChange = 6,
        HeadlossForm = 7,
        GlobalEffic = 8,
        GlobalPrice = 9,
        GlobalPattern = 10,
        DemandCharge = 11,
    }
}

selector! {
    /// Time parameters.
    TimeParam {
        Duration = 0,
        HydStep = 1,
        QualStep = 2,
        PatternStep = 3,
        PatternStart = 4,
        ReportStep = 5,
        ReportStart = 6,
        RuleStep = 7,
        Statistic = 8,
        Periods = 9,
        StartTime = 10,
        HTime = 11,
        QTime = 12,
    }
}

selector! {
    /// Element-count queries.
    CountType {
        Nodes = 0,
        Tanks = 1,
        Links = 2,
        Patterns = 3,
        Curves = 4,
        Controls = 5,
        Rules = 6,
    }
}

selector! {
    /// Deletion behavior for referenced elements.
    ActionCode {
        Unconditional = 0,
        Conditional = 1,
    }
}

selector! {
    /// Post-run statistics.
    StatisticType {
        Iterations = 0,
        RelativeError = 1,
        MaxHeadError = 2,
        MaxFlowChange = 3,
        MassBalance = 4,
    }
}

selector! {
    /// Hydraulic initialization flags (save-to-file and flow re-init).
    InitHydFlag {
        NoSave = 0,
        Save = 1,
        InitFlow = 10,
        SaveAndInit = 11,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_from_round_trips() {
        assert_eq!(NodeProperty::try_from(11).unwrap(), NodeProperty::Pressure);
        assert_eq!(LinkProperty::try_from(8).unwrap(), LinkProperty::Flow);
        assert!(NodeProperty::try_from(99).is_err());
        assert!(LinkProperty::try_from(16).is_err());
    }
}
